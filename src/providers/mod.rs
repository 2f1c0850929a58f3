//! Upstream provider plumbing.
//!
//! Everything that touches the provider wire format lives here: tolerant
//! serde shapes for both response families, request-URL construction with
//! the fixed parameter sets, the country code-to-name map for composite
//! location strings, and harvesting of account-usage response headers.

pub mod country;
pub mod headers;
pub mod request;
pub mod shapes;

pub use country::country_name;
pub use headers::{harvest_usage, AccountUsage};
pub use request::{build_custom_search_url, build_native_serp_url};
pub use shapes::{
    CustomSearchItem, CustomSearchResponse, NativeSerpResponse, OrganicResult, RelatedQuestion,
};
