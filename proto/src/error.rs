use thiserror::Error;

/// Failure to make sense of a single subscription payload
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty payload")]
    Empty,
    #[error("malformed operation `{excerpt}`: {source}")]
    Malformed {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    const EXCERPT_LEN: usize = 120;

    pub(crate) fn excerpt(payload: &str) -> String {
        match payload.char_indices().nth(Self::EXCERPT_LEN) {
            Some((idx, _)) => format!("{}…", &payload[..idx]),
            None => payload.to_owned(),
        }
    }
}
