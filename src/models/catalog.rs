use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single confirmed-exploited vulnerability from the KEV catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub cve_id: String,
    /// Date CISA added the entry, i.e. when exploitation was confirmed.
    pub date_added: NaiveDate,
    #[serde(default)]
    pub vendor_project: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub vulnerability_name: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub known_ransomware_campaign_use: String,
}

impl CatalogEntry {
    pub fn new(cve_id: &str, date_added: NaiveDate) -> Self {
        Self {
            cve_id: cve_id.to_string(),
            date_added,
            vendor_project: String::new(),
            product: String::new(),
            vulnerability_name: String::new(),
            due_date: None,
            known_ransomware_campaign_use: String::new(),
        }
    }
}
