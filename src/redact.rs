use crate::models::{ApplicationView, Role};

/// ResponseRedactor
///
/// Blanks personal contact and demographic fields of applications shown to a
/// `LimitedHelper`. Every other viewer gets an unchanged copy.
pub struct ResponseRedactor;

impl ResponseRedactor {
    pub fn redact(view: &ApplicationView, viewer: Role) -> ApplicationView {
        let mut out = view.clone();
        if viewer == Role::LimitedHelper {
            out.phone.clear();
            out.nationality.clear();
            out.address.clear();
            out.address_extra.clear();
            out.zip.clear();
            out.city.clear();
            out.country.clear();
            out.survey_data.clear();
            out.gender.clear();
            out.education_level = 0;
        }
        out
    }

    pub fn redact_all(views: &[ApplicationView], viewer: Role) -> Vec<ApplicationView> {
        views.iter().map(|view| Self::redact(view, viewer)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn bob() -> ApplicationView {
        ApplicationView {
            id: 3,
            user_id: 7,
            first_name: "Bob".to_string(),
            last_name: "Builder".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 4, 1),
            phone: "555".to_string(),
            nationality: "Bobland".to_string(),
            address: "1 Bob Street".to_string(),
            address_extra: "Flat 2".to_string(),
            zip: "12345".to_string(),
            city: "bobtown".to_string(),
            country: "Bobland".to_string(),
            survey_data: "{\"heardFrom\":\"friend\"}".to_string(),
            gender: "m".to_string(),
            education_level: 3,
            status: "received".to_string(),
            blocked_until: None,
            created_at: Utc::now(),
            edited_at: Utc::now(),
        }
    }

    #[test]
    fn limited_helper_sees_blank_sensitive_fields() {
        let original = bob();
        let redacted = ResponseRedactor::redact(&original, Role::LimitedHelper);

        assert_eq!(redacted.phone, "");
        assert_eq!(redacted.city, "");
        assert_eq!(redacted.zip, "");
        assert_eq!(redacted.address, "");
        assert_eq!(redacted.address_extra, "");
        assert_eq!(redacted.country, "");
        assert_eq!(redacted.nationality, "");
        assert_eq!(redacted.survey_data, "");
        assert_eq!(redacted.gender, "");
        assert_eq!(redacted.education_level, 0);

        assert_eq!(redacted.id, original.id);
        assert_eq!(redacted.user_id, original.user_id);
        assert_eq!(redacted.first_name, "Bob");
        assert_eq!(redacted.birthday, original.birthday);
        assert_eq!(redacted.status, original.status);

        // input untouched
        assert_eq!(original.phone, "555");
    }

    #[test]
    fn other_roles_see_everything() {
        let original = bob();
        for role in [
            Role::Admin,
            Role::SubAdmin,
            Role::TrustedHelper,
            Role::Applicant,
            Role::None,
        ] {
            assert_eq!(ResponseRedactor::redact(&original, role), original);
        }
    }

    #[test]
    fn lists_are_redacted_per_item() {
        let views = vec![bob(), bob()];
        let redacted = ResponseRedactor::redact_all(&views, Role::LimitedHelper);
        assert_eq!(redacted.len(), 2);
        assert!(redacted.iter().all(|v| v.phone.is_empty() && v.city.is_empty()));
    }
}
