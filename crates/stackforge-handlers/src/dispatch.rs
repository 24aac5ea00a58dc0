//! Mapping deployed function names onto handler operations

use crate::error::{HandlerError, Result};
use crate::files::FileHandlers;
use crate::response::{Response, respond};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    List,
    Generate,
    Delete,
    Process,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 4] = [
        HandlerKind::List,
        HandlerKind::Generate,
        HandlerKind::Delete,
        HandlerKind::Process,
    ];

    /// Suffix of the deployed function name, `{project}-file-<op>`
    pub fn suffix(&self) -> &'static str {
        match self {
            HandlerKind::List => "file-list",
            HandlerKind::Generate => "file-generate",
            HandlerKind::Delete => "file-delete",
            HandlerKind::Process => "file-process",
        }
    }

    pub fn from_function_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| name.ends_with(&format!("-{}", kind.suffix())))
            .ok_or_else(|| {
                HandlerError::BadRequest(format!("no handler for function '{}'", name))
            })
    }
}

impl FileHandlers {
    /// Run one invocation; failures come back as a 500 response
    pub async fn handle(&self, kind: HandlerKind, payload: Value) -> Response {
        let result = match kind {
            HandlerKind::List => self.list().await,
            HandlerKind::Generate => self.generate().await,
            HandlerKind::Delete => match serde_json::from_value(payload) {
                Ok(request) => self.delete(&request).await,
                Err(e) => Err(e.into()),
            },
            HandlerKind::Process => match serde_json::from_value(payload) {
                Ok(event) => self.process(&event).await,
                Err(e) => Err(e.into()),
            },
        };
        respond(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_function_name() {
        assert_eq!(
            HandlerKind::from_function_name("file-management-file-list").unwrap(),
            HandlerKind::List
        );
        assert_eq!(
            HandlerKind::from_function_name("demo-file-process").unwrap(),
            HandlerKind::Process
        );
        assert!(HandlerKind::from_function_name("demo-file-upload").is_err());
        assert!(HandlerKind::from_function_name("file-list").is_err());
    }
}
