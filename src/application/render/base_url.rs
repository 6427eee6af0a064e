//! Public URL of a commit's preview, passed to the site generator.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BaseUrlError {
    #[error("can not parse base URL `{url}`: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base URL `{url}` can not carry a path")]
    NotHierarchical { url: String },
}

/// Derive `<configured path>/preview/<commit>/` from the configured base URL.
///
/// Empty segments of the configured path are collapsed, so a trailing slash on
/// the configured URL makes no difference. The result always ends in `/`.
pub fn base_url(configured: &str, commit_hash: &str) -> Result<Url, BaseUrlError> {
    let configured = configured.trim();
    let mut url = Url::parse(configured).map_err(|source| BaseUrlError::Parse {
        url: configured.to_string(),
        source,
    })?;

    if url.cannot_be_a_base() {
        return Err(BaseUrlError::NotHierarchical {
            url: configured.to_string(),
        });
    }

    let prefix = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    let path = if prefix.is_empty() {
        format!("/preview/{commit_hash}/")
    } else {
        format!("/{prefix}/preview/{commit_hash}/")
    };
    url.set_path(&path);

    Ok(url)
}
