use serde::{Deserialize, Serialize};

/// The service identity reported by `org.varlink.service.GetInfo`.
///
/// The list of available interfaces is not part of this type; the router appends it from its
/// registry when answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// The vendor of the service.
    pub vendor: String,
    /// The product name.
    pub product: String,
    /// The product version.
    pub version: String,
    /// The product URL.
    pub url: String,
}

impl Info {
    /// Create a new service identity.
    pub fn new(
        vendor: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            product: product.into(),
            version: version.into(),
            url: url.into(),
        }
    }
}
