//! Site record types
//!
//! A site record is one monitored network element's current status. Only the
//! identifier and the severity are interpreted; every other field of the
//! source document, including its original key names and number formatting,
//! is carried through untouched in `extra`.

use crate::ids::GeoId;
use crate::numeric::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// KPI name keys seen in source data, in lookup order
const KPI_KEYS: [&str; 2] = ["kpi", "kpiType"];

/// One monitored network cell/site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub geo_id: GeoId,
    pub severity: Severity,
    /// Every other field (market, kpi/kpiType, value, lat, lng, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteRecord {
    pub fn new(
        geo_id: impl Into<GeoId>,
        severity: Severity,
        market: impl Into<String>,
        kpi: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        let mut extra = Map::new();
        extra.insert("market".to_string(), Value::String(market.into()));
        extra.insert("kpi".to_string(), Value::String(kpi.into()));
        if let Some(value) = value {
            extra.insert("value".to_string(), value);
        }
        Self {
            geo_id: geo_id.into(),
            severity,
            extra,
        }
    }

    pub fn market(&self) -> Option<&str> {
        self.extra.get("market").and_then(Value::as_str)
    }

    /// KPI name under whichever key the source used
    pub fn kpi(&self) -> Option<&str> {
        KPI_KEYS
            .iter()
            .find_map(|key| self.extra.get(*key).and_then(Value::as_str))
    }

    /// Raw KPI reading: a number or preformatted text (e.g. "87%")
    pub fn value(&self) -> Option<&Value> {
        self.extra.get("value")
    }

    /// Same record with a different severity, all other fields unchanged
    pub fn with_severity(&self, severity: Severity) -> Self {
        Self {
            severity,
            ..self.clone()
        }
    }
}

/// Fresh severity for one site, applied by repository writers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityUpdate {
    pub geo_id: GeoId,
    pub severity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_dashboard_record() {
        let json = r#"{
            "geoId": "DAL016",
            "severity": 4,
            "market": "Dallas",
            "kpiType": "CQI",
            "value": 6.2,
            "lat": 32.9,
            "lng": -96.8,
            "enodeb": "eNB-5521"
        }"#;
        let site: SiteRecord = serde_json::from_str(json).unwrap();
        assert_eq!(site.geo_id.as_str(), "DAL016");
        assert_eq!(site.severity.value(), 4.0);
        assert_eq!(site.market(), Some("Dallas"));
        assert_eq!(site.kpi(), Some("CQI"));
        assert_eq!(site.value(), Some(&json!(6.2)));
        assert_eq!(site.extra["enodeb"], "eNB-5521");
    }

    #[test]
    fn test_fields_pass_through_unchanged() {
        let json = r#"{"geoId":"CHI003","severity":5,"market":"Chicago","kpiType":"Drop Rate","value":6,"state":"IL"}"#;
        let site: SiteRecord = serde_json::from_str(json).unwrap();
        let out = serde_json::to_value(&site).unwrap();
        let input: Value = serde_json::from_str(json).unwrap();
        assert_eq!(out, input);
        assert_eq!(serde_json::to_string(&out["value"]).unwrap(), "6");
        assert!(out.get("kpi").is_none());
    }

    #[test]
    fn test_missing_value_is_not_invented() {
        let json = r#"{"geoId":"X1","severity":1,"market":"Dallas","kpi":"CQI"}"#;
        let site: SiteRecord = serde_json::from_str(json).unwrap();
        assert!(site.value().is_none());
        let out = serde_json::to_value(&site).unwrap();
        assert!(out.get("value").is_none());
    }

    #[test]
    fn test_only_id_and_severity_are_required() {
        let site: SiteRecord = serde_json::from_str(r#"{"geoId":"X1","severity":2}"#).unwrap();
        assert!(site.market().is_none());
        assert!(site.kpi().is_none());

        let json = r#"{"geoId":"X1","market":"Dallas","kpi":"CQI"}"#;
        assert!(serde_json::from_str::<SiteRecord>(json).is_err());
    }

    #[test]
    fn test_with_severity_keeps_other_fields() {
        let site = SiteRecord::new("OKL044", Severity::new(2.0).unwrap(), "Oklahoma", "RSRP", None);
        let bumped = site.with_severity(Severity::new(5.0).unwrap());
        assert_eq!(bumped.geo_id, site.geo_id);
        assert_eq!(bumped.market(), Some("Oklahoma"));
        assert_eq!(bumped.kpi(), Some("RSRP"));
        assert_eq!(bumped.severity.value(), 5.0);
    }
}
