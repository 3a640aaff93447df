//! Source reference validation and canonicalisation.

use std::fmt;
use std::str::FromStr;

use reelpipe_common::{Error, Result};
use reqwest::Url;

const INSTAGRAM_ENTITIES: &[&str] = &["p", "reel", "reels", "tv"];
const DRIVE_ID_MIN_LEN: usize = 10;

/// A validated reference to remote media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceReference {
    /// Any other http(s) URL, fetched as-is.
    Direct(Url),
    /// An Instagram post, reel or IGTV page.
    Instagram {
        entity: String,
        shortcode: String,
        canonical_url: String,
    },
    /// A Google Drive file.
    GoogleDrive { file_id: String },
}

impl SourceReference {
    /// Parse and validate `input` without touching the network.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidReference`] for anything that is not an absolute http(s)
    /// URL, an Instagram URL with an unknown path shape, or a Google Drive URL
    /// without a recognisable file id.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidReference("reference is empty".to_string()));
        }

        let url = Url::parse(input)
            .map_err(|e| Error::InvalidReference(format!("{input}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidReference(format!(
                "{input}: scheme must be http or https"
            )));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => return Err(Error::InvalidReference(format!("{input}: missing host"))),
        };

        if is_domain(&host, "instagram.com") {
            return parse_instagram(&url);
        }
        if is_domain(&host, "drive.google.com") || is_domain(&host, "docs.google.com") {
            return parse_google_drive(&url);
        }

        Ok(SourceReference::Direct(url))
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Instagram { .. } => "instagram",
            Self::GoogleDrive { .. } => "google_drive",
        }
    }

    /// Canonical textual form, stable across equivalent inputs.
    pub fn canonical(&self) -> String {
        match self {
            Self::Direct(url) => url.to_string(),
            Self::Instagram { canonical_url, .. } => canonical_url.clone(),
            Self::GoogleDrive { file_id } => {
                format!("https://drive.google.com/file/d/{file_id}/view")
            }
        }
    }
}

impl FromStr for SourceReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn is_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

fn parse_instagram(url: &Url) -> Result<SourceReference> {
    let parts = segments(url);
    let invalid = |why: &str| Error::InvalidReference(format!("{url}: {why}"));

    let (entity, shortcode) = match parts.as_slice() {
        [entity, shortcode, ..] => (entity.to_ascii_lowercase(), *shortcode),
        _ => return Err(invalid("unsupported Instagram URL format")),
    };

    if !INSTAGRAM_ENTITIES.contains(&entity.as_str()) {
        return Err(invalid("unsupported Instagram URL format"));
    }
    if !shortcode.chars().all(is_id_char) {
        return Err(invalid("invalid Instagram shortcode"));
    }

    let entity = if entity == "reels" { "reel".to_string() } else { entity };
    let canonical_url = format!("https://www.instagram.com/{entity}/{shortcode}/");

    Ok(SourceReference::Instagram {
        entity,
        shortcode: shortcode.to_string(),
        canonical_url,
    })
}

fn is_drive_id(s: &str) -> bool {
    s.len() >= DRIVE_ID_MIN_LEN && s.chars().all(is_id_char)
}

fn parse_google_drive(url: &Url) -> Result<SourceReference> {
    let parts = segments(url);

    // `/file/d/{id}/view`, `/open/d/{id}` and friends.
    let from_d = parts
        .windows(2)
        .find(|w| w[0] == "d" && is_drive_id(w[1]))
        .map(|w| w[1].to_string());

    let from_last = || {
        parts
            .last()
            .filter(|seg| is_drive_id(seg))
            .map(|seg| seg.to_string())
    };

    let from_query = || {
        url.query_pairs()
            .find(|(k, v)| (k == "id" || k == "file_id") && is_drive_id(v))
            .map(|(_, v)| v.into_owned())
    };

    from_d
        .or_else(from_last)
        .or_else(from_query)
        .map(|file_id| SourceReference::GoogleDrive { file_id })
        .ok_or_else(|| {
            Error::InvalidReference(format!(
                "{url}: unable to extract file id from Google Drive URL"
            ))
        })
}
