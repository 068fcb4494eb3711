use crate::devices::registry::DeviceRegistry;
use crate::devices::TargetSelector;
use crate::extension_control::error::OperationError;
use crate::extension_control::ExtensionControl;
use crate::staging::ArtifactStager;
use crate::tasks::PackageTaskDriver;
use crate::upload::ExtensionUploader;
use actix_web::http::StatusCode;
use actix_web::web::{self, Data};
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters accepted on the query string. `name` narrows queries to a
/// single extension, `url` carries the artifact location for requests
/// without a body (DELETE in particular).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct OperationQuery {
    target_host: Option<String>,
    target_port: Option<u16>,
    #[serde(rename = "targetUUID")]
    target_uuid: Option<String>,
    name: Option<String>,
    url: Option<String>,
}

/// JSON body of install, update and uninstall requests. Addressing fields
/// given here win over their query string counterparts.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct OperationBody {
    url: Option<String>,
    target_host: Option<String>,
    target_port: Option<u16>,
    #[serde(rename = "targetUUID")]
    target_uuid: Option<String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("{0}")]
    InvalidRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Operation(err) => operation_status(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            code: self.status_code().as_u16(),
            message: self.to_string(),
        })
    }
}

fn operation_status(err: &OperationError) -> StatusCode {
    match err {
        OperationError::UntrustedTarget(_)
        | OperationError::NotInstalled { .. }
        | OperationError::ExtensionNotFound(_) => StatusCode::NOT_FOUND,
        OperationError::MissingSourceUrl | OperationError::Staging(_) => StatusCode::BAD_REQUEST,
        OperationError::DuplicateOperation { .. } | OperationError::AlreadyInstalled { .. } => {
            StatusCode::CONFLICT
        }
        OperationError::Uninstall { .. }
        | OperationError::DeviceRegistry(_)
        | OperationError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(super) async fn query<G, S, U, D>(
    control: Data<ExtensionControl<G, S, U, D>>,
    query: web::Query<OperationQuery>,
) -> Result<HttpResponse, ApiError>
where
    G: DeviceRegistry + 'static,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    let selector = selector(&query, None);
    match normalized(query.name.clone()) {
        Some(name) => {
            let extension = control.query_by_name(&selector, &name).await?;
            Ok(HttpResponse::Ok().json(extension))
        }
        None => {
            let extensions = control.query(&selector).await?;
            Ok(HttpResponse::Ok().json(extensions))
        }
    }
}

pub(super) async fn install<G, S, U, D>(
    control: Data<ExtensionControl<G, S, U, D>>,
    query: web::Query<OperationQuery>,
    payload: web::Bytes,
) -> Result<HttpResponse, ApiError>
where
    G: DeviceRegistry + 'static,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    let body = parse_body(&payload)?;
    let selector = selector(&query, body.as_ref());
    let url = source_url(&query, body.as_ref())?;
    let record = control.install(&selector, &url).await?;
    Ok(HttpResponse::Accepted().json(record))
}

pub(super) async fn update<G, S, U, D>(
    control: Data<ExtensionControl<G, S, U, D>>,
    query: web::Query<OperationQuery>,
    payload: web::Bytes,
) -> Result<HttpResponse, ApiError>
where
    G: DeviceRegistry + 'static,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    let body = parse_body(&payload)?;
    let selector = selector(&query, body.as_ref());
    let url = source_url(&query, body.as_ref())?;
    let record = control.update(&selector, &url).await?;
    Ok(HttpResponse::Accepted().json(record))
}

pub(super) async fn uninstall<G, S, U, D>(
    control: Data<ExtensionControl<G, S, U, D>>,
    query: web::Query<OperationQuery>,
    payload: web::Bytes,
) -> Result<HttpResponse, ApiError>
where
    G: DeviceRegistry + 'static,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    let body = parse_body(&payload)?;
    let selector = selector(&query, body.as_ref());
    let url = source_url(&query, body.as_ref())?;
    let message = control.uninstall(&selector, &url).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "msg": message })))
}

fn parse_body(payload: &web::Bytes) -> Result<Option<OperationBody>, ApiError> {
    if payload.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(payload)
        .map(Some)
        .map_err(|err| ApiError::InvalidRequest(format!("invalid request body: {err}")))
}

fn source_url(query: &OperationQuery, body: Option<&OperationBody>) -> Result<String, ApiError> {
    body.and_then(|body| normalized(body.url.clone()))
        .or_else(|| normalized(query.url.clone()))
        .ok_or_else(|| OperationError::MissingSourceUrl.into())
}

fn selector(query: &OperationQuery, body: Option<&OperationBody>) -> TargetSelector {
    TargetSelector {
        host: body
            .and_then(|body| normalized(body.target_host.clone()))
            .or_else(|| normalized(query.target_host.clone())),
        port: body.and_then(|body| body.target_port).or(query.target_port),
        uuid: body
            .and_then(|body| normalized(body.target_uuid.clone()))
            .or_else(|| normalized(query.target_uuid.clone())),
    }
}

/// Clients address the local gateway by leaving the field out or sending an
/// empty string.
fn normalized(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::registry::MockDeviceRegistry;
    use crate::devices::resolver::TargetResolver;
    use crate::devices::TrustedDevice;
    use crate::staging::{MockArtifactStager, StageOutcome};
    use crate::tasks::{MockPackageTaskDriver, TaskRequest};
    use crate::upload::MockExtensionUploader;
    use actix_web::body::MessageBody;
    use rstest::rstest;
    use serde_json::{json, Value};
    use std::time::Duration;

    type TestControl = ExtensionControl<
        MockDeviceRegistry,
        MockArtifactStager,
        MockExtensionUploader,
        MockPackageTaskDriver,
    >;

    fn control(
        devices: MockDeviceRegistry,
        stager: MockArtifactStager,
        uploader: MockExtensionUploader,
        tasks: MockPackageTaskDriver,
    ) -> Data<TestControl> {
        Data::new(ExtensionControl::new(
            TargetResolver::new(devices),
            stager,
            uploader,
            tasks,
            Duration::from_millis(200),
            "/tmp",
        ))
    }

    fn reporting(packages: Value) -> MockPackageTaskDriver {
        let mut tasks = MockPackageTaskDriver::new();
        tasks
            .expect_run()
            .withf(|_, request, _| *request == TaskRequest::Query)
            .returning(move |_, _, _| Ok(packages.clone()));
        tasks
    }

    fn body_bytes(response: HttpResponse) -> Value {
        let bytes = response.into_body().try_into_bytes().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn query_params(query: OperationQuery) -> web::Query<OperationQuery> {
        web::Query(query)
    }

    #[rstest]
    #[case::body_wins_over_query(
        OperationQuery { target_host: Some("10.0.0.1".into()), target_port: Some(8443), ..Default::default() },
        Some(OperationBody { target_host: Some("172.17.0.2".into()), ..Default::default() }),
        TargetSelector { host: Some("172.17.0.2".into()), port: Some(8443), uuid: None }
    )]
    #[case::empty_strings_mean_local(
        OperationQuery { target_host: Some(String::new()), ..Default::default() },
        Some(OperationBody { target_uuid: Some(String::new()), ..Default::default() }),
        TargetSelector::default()
    )]
    #[case::uuid_from_the_body(
        OperationQuery::default(),
        Some(OperationBody { target_uuid: Some("abc-123".into()), ..Default::default() }),
        TargetSelector { host: None, port: None, uuid: Some("abc-123".into()) }
    )]
    #[case::query_only(
        OperationQuery { target_host: Some("172.17.0.5".into()), ..Default::default() },
        None,
        TargetSelector { host: Some("172.17.0.5".into()), port: None, uuid: None }
    )]
    fn selector_merges_query_and_body(
        #[case] query: OperationQuery,
        #[case] body: Option<OperationBody>,
        #[case] expected: TargetSelector,
    ) {
        assert_eq!(selector(&query, body.as_ref()), expected);
    }

    #[tokio::test]
    async fn query_returns_the_extension_listing() {
        let tasks = reporting(json!([{ "name": "telemetry", "packageName": "telemetry-1.2.0" }]));
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            tasks,
        );

        let response = query(control, query_params(OperationQuery::default()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response);
        assert_eq!(body[0]["rpmFile"], "telemetry-1.2.0.rpm");
        assert_eq!(body[0]["state"], "AVAILABLE");
        assert_eq!(body[0]["downloadUrl"], "https://localhost:8100/tmp/telemetry-1.2.0.rpm");
    }

    #[tokio::test]
    async fn query_by_name_returns_a_single_record() {
        let tasks = reporting(json!([
            { "name": "telemetry", "packageName": "telemetry-1.2.0" },
            { "name": "gateway-tools", "packageName": "gateway-tools-0.9.1" },
        ]));
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            tasks,
        );

        let response = query(
            control,
            query_params(OperationQuery {
                name: Some("telemetry".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response);
        assert_eq!(body["name"], "telemetry");
        assert_eq!(body["rpmFile"], "telemetry-1.2.0.rpm");
    }

    #[tokio::test]
    async fn unknown_extension_names_map_to_not_found() {
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            reporting(json!([])),
        );

        let err = query(
            control,
            query_params(OperationQuery {
                name: Some("missing".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let body = body_bytes(err.error_response());
        assert_eq!(body["code"], 404);
        assert_eq!(body["message"], "no extension with name missing found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_is_accepted_with_the_requested_snapshot() {
        let mut devices = MockDeviceRegistry::new();
        devices.expect_trusted_devices().returning(|| {
            Ok(vec![TrustedDevice {
                host: "172.17.0.2".to_string(),
                port: 443,
                uuid: None,
                discovery_state: Some("UNDISCOVERED".to_string()),
            }])
        });
        let mut stager = MockArtifactStager::new();
        stager
            .expect_stage()
            .returning(|_| Ok(StageOutcome::Staged("demo-0.1.0.rpm".to_string())));
        let mut uploader = MockExtensionUploader::new();
        uploader.expect_upload().returning(|_, _| Ok(()));
        let mut tasks = reporting(json!([]));
        tasks
            .expect_run()
            .withf(|_, request, _| matches!(request, TaskRequest::Install { .. }))
            .returning(|_, _, _| Ok(json!({ "status": "FINISHED" })));
        let control = control(devices, stager, uploader, tasks);

        let response = install(
            control,
            query_params(OperationQuery {
                target_host: Some("172.17.0.2".into()),
                target_port: Some(443),
                ..Default::default()
            }),
            web::Bytes::from_static(br#"{"url":"https://repo.example.com/demo-0.1.0.rpm"}"#),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_bytes(response);
        assert_eq!(body["state"], "REQUESTED");
        assert_eq!(body["rpmFile"], "demo-0.1.0.rpm");
        assert_eq!(body["downloadUrl"], "https://repo.example.com/demo-0.1.0.rpm");
    }

    #[tokio::test]
    async fn install_without_a_url_is_rejected() {
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            MockPackageTaskDriver::new(),
        );

        let err = install(
            control,
            query_params(OperationQuery::default()),
            web::Bytes::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "a download URL must be defined to install a package"
        );
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            MockPackageTaskDriver::new(),
        );

        let err = install(
            control,
            query_params(OperationQuery::default()),
            web::Bytes::from_static(b"{not json"),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn uninstall_reports_the_removed_package() {
        let mut tasks = reporting(json!([{ "name": "demo", "packageName": "demo-0.1.0" }]));
        tasks
            .expect_run()
            .withf(|_, request, _| *request == TaskRequest::uninstall("demo-0.1.0"))
            .returning(|_, _, _| Ok(json!({ "status": "FINISHED" })));
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            tasks,
        );

        // DELETE requests carry the url on the query string, without a body.
        let response = uninstall(
            control,
            query_params(OperationQuery {
                url: Some("https://repo.example.com/demo-0.1.0.rpm".into()),
                ..Default::default()
            }),
            web::Bytes::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response);
        assert_eq!(
            body["msg"],
            "package in demo-0.1.0.rpm uninstalled on target localhost:8100"
        );
    }

    #[tokio::test]
    async fn uninstall_of_a_missing_extension_is_not_found() {
        let control = control(
            MockDeviceRegistry::new(),
            MockArtifactStager::new(),
            MockExtensionUploader::new(),
            reporting(json!([])),
        );

        let err = uninstall(
            control,
            query_params(OperationQuery::default()),
            web::Bytes::from_static(br#"{"url":"https://repo.example.com/demo-0.1.0.rpm"}"#),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let body = body_bytes(err.error_response());
        assert_eq!(body["code"], 404);
    }
}
