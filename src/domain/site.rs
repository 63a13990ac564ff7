use serde_json::{Map, Value};

use crate::domain::SiteDescriptor;

/// Free-form per-site settings persisted as a JSON object.
pub type SiteUserSettings = Map<String, Value>;

/// Persistent registration record of one configured site.
#[derive(Debug, Clone, PartialEq)]
pub struct ChanSiteData {
    pub site: SiteDescriptor,
    pub order: usize,
    pub active: bool,
    pub user_settings: SiteUserSettings,
}

impl ChanSiteData {
    pub fn new(site: SiteDescriptor, order: usize) -> Self {
        Self {
            site,
            order,
            active: false,
            user_settings: SiteUserSettings::new(),
        }
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.user_settings.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DescriptorInterner;

    #[test]
    fn test_new_site_data_is_inactive() {
        let site = DescriptorInterner::new().get_or_create("4chan");
        let data = ChanSiteData::new(site, 3);
        assert!(!data.active);
        assert_eq!(data.order, 3);
        assert!(data.user_settings.is_empty());
    }

    #[test]
    fn test_setting_str() {
        let site = DescriptorInterner::new().get_or_create("4chan");
        let mut data = ChanSiteData::new(site, 0);
        data.user_settings
            .insert("pass_token".into(), Value::String("abc".into()));
        data.user_settings.insert("count".into(), Value::from(3));

        assert_eq!(data.setting_str("pass_token"), Some("abc"));
        assert_eq!(data.setting_str("count"), None);
        assert_eq!(data.setting_str("missing"), None);
    }
}
