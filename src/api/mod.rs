//! Data-access façade over the remote service.
//!
//! Every operation performs one unit of work against the remote and returns
//! [`AppResult`]. Required identifiers are checked before any remote call;
//! failures are logged where they happen and handed back to the caller.

mod files;
mod posts;
mod tags;
mod users;

use crate::config::CollectionsConfig;
use crate::error::{AppError, AppResult};
use crate::remote::Remote;

pub use self::posts::{POSTS_PER_PAGE, RECENT_POSTS_LIMIT};
pub use self::tags::parse_tags;

#[derive(Clone)]
pub struct Api {
    remote: Remote,
    ids: CollectionsConfig,
}

impl Api {
    pub fn new(remote: Remote, ids: CollectionsConfig) -> Self {
        Self { remote, ids }
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn ids(&self) -> &CollectionsConfig {
        &self.ids
    }
}

/// Longest id the remote accepts.
const MAX_ID_LEN: usize = 36;

fn require<'a>(value: Option<&'a str>, what: &str) -> AppResult<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("{} is required", what)))
}

/// Like [`require`], and the value must also be a valid remote id: at most
/// 36 of `a-z A-Z 0-9 . - _`, not starting with a special character.
fn require_id<'a>(value: Option<&'a str>, what: &str) -> AppResult<&'a str> {
    let id = require(value, what)?;

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    let leading_ok = id.starts_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_chars || !leading_ok || id.len() > MAX_ID_LEN {
        return Err(AppError::validation(format!("{} {:?} is not a valid id", what, id)));
    }
    Ok(id)
}
