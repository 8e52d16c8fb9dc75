//! Page-info locator
//!
//! Destination types opt into pagination by implementing [`Paginated`].
//! Typed responses expose their `pageInfo` field directly; dynamic
//! `serde_json::Value` payloads are searched structurally.

use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// Conventional field name of the pagination-control object
pub const PAGE_INFO_FIELD: &str = "pageInfo";

/// Pagination state of one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Cursor of the last item on this page
    #[serde(default)]
    pub end_cursor: Option<String>,
    /// Whether another page follows
    pub has_next_page: bool,
}

impl PageInfo {
    /// Page info pointing at a following page
    pub fn next(cursor: impl Into<String>) -> Self {
        Self {
            end_cursor: Some(cursor.into()),
            has_next_page: true,
        }
    }

    /// Page info of the final page
    pub fn last(cursor: Option<String>) -> Self {
        Self {
            end_cursor: cursor,
            has_next_page: false,
        }
    }
}

/// Capability of a destination type to report its page info
///
/// Return `None` when the value carries no page info at all, for example
/// when an optional connection wrapper is absent.
pub trait Paginated {
    /// Page info of this page, if the value carries one
    fn page_info(&self) -> Option<PageInfo>;
}

impl Paginated for PageInfo {
    fn page_info(&self) -> Option<PageInfo> {
        Some(self.clone())
    }
}

impl<T: Paginated + ?Sized> Paginated for &T {
    fn page_info(&self) -> Option<PageInfo> {
        (**self).page_info()
    }
}

impl<T: Paginated + ?Sized> Paginated for Box<T> {
    fn page_info(&self) -> Option<PageInfo> {
        (**self).page_info()
    }
}

impl<T: Paginated + ?Sized> Paginated for Rc<T> {
    fn page_info(&self) -> Option<PageInfo> {
        (**self).page_info()
    }
}

impl<T: Paginated + ?Sized> Paginated for Arc<T> {
    fn page_info(&self) -> Option<PageInfo> {
        (**self).page_info()
    }
}

impl<T: Paginated> Paginated for Option<T> {
    fn page_info(&self) -> Option<PageInfo> {
        self.as_ref().and_then(Paginated::page_info)
    }
}

impl Paginated for serde_json::Value {
    /// Depth-first search for the first `pageInfo` object carrying a boolean
    /// `hasNextPage`
    fn page_info(&self) -> Option<PageInfo> {
        match self {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    if key == PAGE_INFO_FIELD {
                        if let Some(info) = page_info_signature(value) {
                            return Some(info);
                        }
                    }
                    if let Some(info) = value.page_info() {
                        return Some(info);
                    }
                }
                None
            }
            serde_json::Value::Array(items) => items.iter().find_map(Paginated::page_info),
            _ => None,
        }
    }
}

fn page_info_signature(value: &serde_json::Value) -> Option<PageInfo> {
    let object = value.as_object()?;
    let has_next_page = object.get("hasNextPage")?.as_bool()?;
    let end_cursor = match object.get("endCursor") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(cursor)) => Some(cursor.clone()),
        Some(_) => return None,
    };
    Some(PageInfo {
        end_cursor,
        has_next_page,
    })
}

/// Why page info could not be located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocateError {
    /// The value carries no page info anywhere
    #[error("value carries no pageInfo; the destination type does not support pagination")]
    NotPaginated,
}

/// Locate the page info of a decoded page
///
/// "Found but exhausted" (`has_next_page == false`) is a valid result, not an
/// error.
pub fn locate<T: Paginated + ?Sized>(page: &T) -> Result<PageInfo, LocateError> {
    page.page_info().ok_or(LocateError::NotPaginated)
}
