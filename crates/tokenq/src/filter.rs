use crate::{Error, Result, ServiceRequest, Status};
use core::str::FromStr;

/// Status half of a [`RequestFilter`]. `All` disables status filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn admits(self, status: Status) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

impl From<Status> for StatusFilter {
    fn from(status: Status) -> Self {
        Self::Only(status)
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    /// Parses `All`, `Pending` or `Completed`. An empty string means `All`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "All" => Ok(Self::All),
            other => other.parse().map(Self::Only),
        }
    }
}

/// Admin-side view over the record set.
///
/// `search` is a case-insensitive substring match against the name, email,
/// contact number and decimal token number (any one suffices). The status
/// filter is an exact match. Both halves must hold for a record to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    search: Option<String>,
    status: StatusFilter,
}

impl RequestFilter {
    /// Sets the search text. Blank text clears the search.
    #[must_use]
    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        let needle = search.as_ref().trim().to_lowercase();
        self.search = (!needle.is_empty()).then_some(needle);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn status(&self) -> StatusFilter {
        self.status
    }

    pub fn matches(&self, request: &ServiceRequest) -> bool {
        self.status.admits(request.status) && self.matches_search(request)
    }

    fn matches_search(&self, request: &ServiceRequest) -> bool {
        let Some(needle) = self.search.as_deref() else {
            return true;
        };
        [
            request.name.as_str(),
            request.email.as_str(),
            request.contact_number.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
            || request.token_number.to_string().contains(needle)
    }

    /// Applies the filter to `requests`, preserving their order.
    pub fn apply(&self, requests: impl IntoIterator<Item = ServiceRequest>) -> Vec<ServiceRequest> {
        requests.into_iter().filter(|r| self.matches(r)).collect()
    }
}
