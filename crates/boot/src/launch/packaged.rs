use async_trait::async_trait;
use tracing::{debug, error};

use super::{LaunchAttempt, LaunchContext, LaunchError, LaunchReport, LaunchStrategy};
use crate::guest;

/// Container format of the application archive.
pub const ARCHIVE_FORMAT: &str = "zip";

/// Location of the packaged application, relative to the page.
pub fn archive_url(application: &str) -> String {
    format!("{}/appcode/appcode.pyt", application)
}

/// Fetches the prebuilt archive, unpacks it, and calls the entry point.
pub struct PackagedLaunch;

#[async_trait]
impl LaunchStrategy for PackagedLaunch {
    fn name(&self) -> &'static str {
        "packaged"
    }

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<LaunchAttempt, LaunchError> {
        let config = ctx.config();
        let application = config
            .application
            .as_deref()
            .ok_or(LaunchError::MissingApplication)?;
        let entrypoint = config.entrypoint.as_deref().unwrap_or(application);
        validate("application", application)?;
        validate("entry point", entrypoint)?;

        let url = archive_url(application);
        debug!("Fetching application archive {}", url);
        let bytes = ctx
            .host
            .http
            .get_bytes(&url)
            .await
            .map_err(|source| LaunchError::Fetch {
                url: url.clone(),
                source,
            })?;

        let runtime = ctx.session.runtime();
        runtime
            .unpack_archive(&bytes, ARCHIVE_FORMAT)
            .map_err(|source| LaunchError::Unpack {
                url: url.clone(),
                source,
            })?;
        debug!("Unpacked {} ({} bytes)", url, bytes.len());

        runtime
            .run_async(&guest::import_and_call(application, entrypoint))
            .await
            .map_err(|source| {
                error!("Entry point {}.{} raised: {}", application, entrypoint, source);
                LaunchError::Invoke {
                    entrypoint: entrypoint.to_string(),
                    source,
                }
            })?;

        Ok(LaunchAttempt::Launched(LaunchReport {
            strategy: self.name().to_string(),
            entrypoint: entrypoint.to_string(),
            module: application.to_string(),
            discovery: None,
        }))
    }
}

fn validate(kind: &'static str, value: &str) -> Result<(), LaunchError> {
    if guest::is_identifier(value) {
        Ok(())
    } else {
        Err(LaunchError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}
