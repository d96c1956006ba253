//! S3 URI syntax checks and remote existence checks.

use anyhow::Result;
use std::fmt;

use crate::error::Error;
use crate::log::RunLog;
use crate::runner::Executor;
use crate::transfer::{self, Transfer};

const SCHEME: &str = "s3://";

/// A URI known to use the `s3://` scheme with a non-empty bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri(String);

impl S3Uri {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let bucket = raw
            .strip_prefix(SCHEME)
            .map(|rest| rest.split('/').next().unwrap_or_default());
        match bucket {
            Some(b) if !b.is_empty() => Ok(S3Uri(raw.to_string())),
            _ => Err(Error::validation(format!(
                "invalid S3 URI '{raw}': expected {SCHEME}<bucket>[/<key>]"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check every URI for the S3 scheme, failing on the first bad one.
pub fn validate_uri_syntax<'a>(uris: impl IntoIterator<Item = &'a str>) -> Result<(), Error> {
    for uri in uris {
        S3Uri::parse(uri)?;
    }
    Ok(())
}

/// List each URI remotely; a failing or empty listing means the object is missing.
pub fn validate_remote_objects_exist<'a>(
    uris: impl IntoIterator<Item = &'a S3Uri>,
    tool: &Transfer,
    exec: &mut dyn Executor,
    log: &mut RunLog,
) -> Result<()> {
    for uri in uris {
        let inv = tool.exists(uri);
        transfer::run_checked(&inv, exec, log).map_err(|e| -> anyhow::Error {
            if matches!(
                e.downcast_ref::<Error>(),
                Some(Error::ExternalTool { code: Some(_), .. })
            ) {
                Error::validation(format!("S3 object does not exist: {uri}")).into()
            } else {
                e
            }
        })?;
        tracing::debug!(%uri, "remote object found");
    }
    Ok(())
}
