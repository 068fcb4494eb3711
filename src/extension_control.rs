pub mod config;
pub mod defaults;
pub mod error;
pub mod http_server;
pub mod record;
pub mod registry;
pub mod run;

use crate::devices::registry::DeviceRegistry;
use crate::devices::resolver::TargetResolver;
use crate::devices::{Target, TargetSelector};
use crate::staging::{self, ArtifactStager, StageOutcome};
use crate::tasks::{PackageTaskDriver, TaskError, TaskRequest};
use crate::upload::ExtensionUploader;
use error::OperationError;
use record::{ExtensionRecord, ExtensionState, PackageIdentity};
use registry::{ExtensionKey, InFlightClaim, InFlightRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Orchestrates extension installation on trusted targets.
///
/// Requests are validated synchronously. Accepted installations claim their
/// `target:artifact` key in the in-flight registry and run download, upload
/// and install on a spawned task that publishes progress through the claim.
/// Removing the record cancels the pipeline at its next stage boundary.
pub struct ExtensionControl<G, S, U, D> {
    resolver: TargetResolver<G>,
    stager: Arc<S>,
    uploader: Arc<U>,
    tasks: Arc<D>,
    registry: InFlightRegistry,
    staging_dir: String,
    task_timeout: Duration,
}

impl<G, S, U, D> ExtensionControl<G, S, U, D>
where
    G: DeviceRegistry,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    pub fn new(
        resolver: TargetResolver<G>,
        stager: S,
        uploader: U,
        tasks: D,
        task_timeout: Duration,
        staging_dir: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            stager: Arc::new(stager),
            uploader: Arc::new(uploader),
            tasks: Arc::new(tasks),
            registry: InFlightRegistry::default(),
            staging_dir: staging_dir.into(),
            task_timeout,
        }
    }

    /// Extensions visible on the resolved target: in-flight records first,
    /// then the packages the target reports as installed.
    pub async fn query(
        &self,
        selector: &TargetSelector,
    ) -> Result<Vec<ExtensionRecord>, OperationError> {
        let target = self.resolver.resolve(selector).await?;
        let mut extensions = self.registry.records_for_target(&target);
        extensions.extend(self.installed_extensions(&target).await?);
        Ok(extensions)
    }

    /// The single extension whose reported name matches `name`.
    pub async fn query_by_name(
        &self,
        selector: &TargetSelector,
        name: &str,
    ) -> Result<ExtensionRecord, OperationError> {
        let extensions = self.query(selector).await?;
        extensions
            .into_iter()
            .find(|extension| extension.package.name == name)
            .ok_or_else(|| OperationError::ExtensionNotFound(name.to_string()))
    }

    /// Accepts an installation request and spawns its pipeline. The returned
    /// record is the REQUESTED snapshot the caller can poll for.
    pub async fn install(
        &self,
        selector: &TargetSelector,
        source_url: &str,
    ) -> Result<ExtensionRecord, OperationError> {
        let target = self.resolver.resolve(selector).await?;
        let (rpm_file, claim, record) = self.claim_request(&target, source_url)?;

        match self.installed_package_name(&target, &rpm_file).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                claim.release();
                return Err(OperationError::AlreadyInstalled {
                    rpm_file,
                    target: target.to_string(),
                });
            }
            Err(err) => {
                claim.release();
                return Err(err);
            }
        }

        info!(%target, rpm_file, url = source_url, "accepted extension install");
        self.spawn_pipeline(target, claim, source_url.to_string());
        Ok(record)
    }

    /// Reinstalls an extension. An installed copy is uninstalled first, then
    /// the regular install pipeline runs.
    pub async fn update(
        &self,
        selector: &TargetSelector,
        source_url: &str,
    ) -> Result<ExtensionRecord, OperationError> {
        let target = self.resolver.resolve(selector).await?;
        let (rpm_file, claim, record) = self.claim_request(&target, source_url)?;

        let installed = match self.installed_package_name(&target, &rpm_file).await {
            Ok(installed) => installed,
            Err(err) => {
                claim.release();
                return Err(err);
            }
        };
        if let Some(package_name) = installed {
            info!(%target, rpm_file, package_name, "uninstalling extension before update");
            if let Err(err) = self.run_uninstall(&target, &package_name).await {
                claim.release();
                return Err(OperationError::Uninstall {
                    rpm_file,
                    target: target.to_string(),
                    source: err,
                });
            }
        }

        info!(%target, rpm_file, url = source_url, "accepted extension update");
        self.spawn_pipeline(target, claim, source_url.to_string());
        Ok(record)
    }

    /// Uninstalls the extension delivered by the URL's file. An in-flight
    /// operation for the same artifact is cancelled by removing its record,
    /// which also counts as a successful uninstall.
    pub async fn uninstall(
        &self,
        selector: &TargetSelector,
        source_url: &str,
    ) -> Result<String, OperationError> {
        let target = self.resolver.resolve(selector).await?;
        let url = staging::parse_source_url(source_url)?;
        let rpm_file = staging::artifact_file_name(&url)?;

        let cancelled = self
            .registry
            .remove(&ExtensionKey::new(&target, &rpm_file))
            .is_some();
        if cancelled {
            info!(%target, rpm_file, "cancelled in-flight extension operation");
        }

        match self.installed_package_name(&target, &rpm_file).await? {
            Some(package_name) => {
                self.run_uninstall(&target, &package_name)
                    .await
                    .map_err(|err| OperationError::Uninstall {
                        rpm_file: rpm_file.clone(),
                        target: target.to_string(),
                        source: err,
                    })?;
                info!(%target, rpm_file, package_name, "uninstalled extension");
                Ok(uninstalled_message(&rpm_file, &target))
            }
            None if cancelled => Ok(uninstalled_message(&rpm_file, &target)),
            None => Err(OperationError::NotInstalled {
                rpm_file,
                target: target.to_string(),
            }),
        }
    }

    /// Validates the source URL and claims the in-flight key, handing back
    /// the REQUESTED record now visible to queries.
    fn claim_request(
        &self,
        target: &Target,
        source_url: &str,
    ) -> Result<(String, InFlightClaim, ExtensionRecord), OperationError> {
        let url = staging::parse_source_url(source_url)?;
        let rpm_file = staging::artifact_file_name(&url)?;
        let record = ExtensionRecord::requested(&rpm_file, source_url);
        let key = ExtensionKey::new(target, &rpm_file);

        let claim = self
            .registry
            .try_claim(key, record.clone())
            .map_err(|existing| OperationError::DuplicateOperation {
                rpm_file: rpm_file.clone(),
                target: target.to_string(),
                state: existing.state.to_string(),
            })?;
        Ok((rpm_file, claim, record))
    }

    /// Packages the target reports as installed, mapped to AVAILABLE records.
    async fn installed_extensions(
        &self,
        target: &Target,
    ) -> Result<Vec<ExtensionRecord>, OperationError> {
        let response = self
            .tasks
            .run(target, TaskRequest::Query, self.task_timeout)
            .await?;
        let packages: Vec<PackageIdentity> = serde_json::from_value(response)
            .map_err(|err| OperationError::Task(TaskError::UnexpectedResponse(err.to_string())))?;

        Ok(packages
            .into_iter()
            .map(|package| {
                let rpm_file = format!("{}.rpm", package.package_name);
                let download_url = format!(
                    "https://{}:{}{}/{}",
                    target.host, target.port, self.staging_dir, rpm_file
                );
                ExtensionRecord::available(rpm_file, download_url, package)
            })
            .collect())
    }

    /// The reported package name owning `rpm_file`, when one is installed.
    async fn installed_package_name(
        &self,
        target: &Target,
        rpm_file: &str,
    ) -> Result<Option<String>, OperationError> {
        let installed = self.installed_extensions(target).await?;
        Ok(installed
            .into_iter()
            .map(|extension| extension.package.package_name)
            .find(|package_name| {
                !package_name.is_empty() && rpm_file.starts_with(package_name.as_str())
            }))
    }

    async fn run_uninstall(&self, target: &Target, package_name: &str) -> Result<(), TaskError> {
        self.tasks
            .run(
                target,
                TaskRequest::uninstall(package_name),
                self.task_timeout,
            )
            .await
            .map(|_| ())
    }

    fn spawn_pipeline(&self, target: Target, claim: InFlightClaim, source_url: String) {
        let stager = self.stager.clone();
        let uploader = self.uploader.clone();
        let tasks = self.tasks.clone();
        let task_timeout = self.task_timeout;
        tokio::spawn(run_pipeline(
            stager,
            uploader,
            tasks,
            target,
            claim,
            source_url,
            task_timeout,
        ));
    }
}

fn uninstalled_message(rpm_file: &str, target: &Target) -> String {
    format!("package in {rpm_file} uninstalled on target {target}")
}

/// Runs the staged installation for one claimed record. Every stage commit
/// goes through the claim, so a concurrent removal stops the pipeline before
/// the next stage starts.
async fn run_pipeline<S, U, D>(
    stager: Arc<S>,
    uploader: Arc<U>,
    tasks: Arc<D>,
    target: Target,
    claim: InFlightClaim,
    source_url: String,
    task_timeout: Duration,
) where
    S: ArtifactStager,
    U: ExtensionUploader,
    D: PackageTaskDriver,
{
    let rpm_file = claim.key().rpm_file().to_string();

    if !claim.advance(ExtensionState::Downloading) {
        info!(%target, rpm_file, "extension operation cancelled before download");
        return;
    }
    match stager.stage(&source_url).await {
        Ok(StageOutcome::Staged(_)) => {}
        Ok(StageOutcome::TransferFailed(reason)) => {
            warn!(%target, rpm_file, reason, "could not download extension artifact");
            claim.fail(&format!("could not download {rpm_file} to the gateway: {reason}"));
            return;
        }
        Err(err) => {
            warn!(%target, rpm_file, %err, "could not stage extension artifact");
            claim.fail(&err.to_string());
            return;
        }
    }

    if !claim.advance(ExtensionState::Uploading) {
        info!(%target, rpm_file, "extension operation cancelled before upload");
        return;
    }
    if let Err(err) = uploader.upload(&target, &rpm_file).await {
        warn!(%target, rpm_file, %err, "could not upload extension artifact");
        claim.fail(&format!("could not upload {rpm_file} to target {target}: {err}"));
        return;
    }

    if !claim.advance(ExtensionState::Installing) {
        info!(%target, rpm_file, "extension operation cancelled before install");
        return;
    }
    if let Err(err) = tasks
        .run(&target, TaskRequest::install(&rpm_file), task_timeout)
        .await
    {
        warn!(%target, rpm_file, %err, "extension install task failed");
        claim.fail(&format!(
            "package in {rpm_file} could not be installed on target {target}: {err}"
        ));
        return;
    }

    if !claim.advance(ExtensionState::Available) {
        info!(%target, rpm_file, "extension operation cancelled before completion");
        return;
    }
    info!(%target, rpm_file, "extension available on target");
    claim.release();
}
