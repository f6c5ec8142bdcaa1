use crate::server::ServerError;
use axum::extract::FromRequestParts;
use axum_extra::extract::Query as AxumQuery;
use serde::Deserialize;

/// Query string extractor that accepts repeated keys.
#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: Vec<String>,
}

impl PageQuery {
    /// The last `page` value, like a query dictionary lookup.
    #[must_use]
    pub fn page(&self) -> Option<&str> {
        self.page.last().map(String::as_str)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    next: Vec<String>,
}

impl NextQuery {
    #[must_use]
    pub fn into_next(mut self) -> Option<String> {
        self.next.pop()
    }
}
