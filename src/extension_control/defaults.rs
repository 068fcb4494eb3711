use std::time::Duration;

/// Host name addressing the local gateway instead of a remote fleet device.
pub const LOCAL_TARGET_HOST: &str = "localhost";
/// Management port of the local gateway REST framework.
pub const LOCAL_TARGET_PORT: u16 = 8100;
/// Port assumed for remote targets when the caller does not provide one.
pub const DEFAULT_REMOTE_PORT: u16 = 443;

pub const DEFAULT_GATEWAY_ENDPOINT: &str = "http://localhost:8100";
pub const DEFAULT_DEVICE_GROUP: &str = "dockerContainers";
pub const LOCAL_ADMIN_USER: &str = "admin";

pub const DEVICE_GROUPS_PATH: &str = "/mgmt/shared/resolver/device-groups";
pub const TOKEN_PATH: &str = "/shared/token";
pub const UPLOADS_PATH: &str = "/mgmt/shared/file-transfer/uploads";
pub const PACKAGE_TASKS_PATH: &str = "/mgmt/shared/iapp/package-management-tasks";

pub const DEFAULT_STAGING_DIR: &str = "/tmp";
/// Directory where the device REST framework leaves uploaded files.
pub const REMOTE_DOWNLOADS_DIR: &str = "/var/config/rest/downloads";

pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 512_000;

pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_millis(120_000);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_CONN_TIMEOUT: Duration = Duration::from_secs(10);

pub const EXTENSIONS_PATH: &str = "/extensions";
