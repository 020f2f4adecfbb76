/// Provider-independent view of the signed-in user.
///
/// Built fresh on every callback and handed to the identity store; it is never
/// persisted as-is. `email` and `avatar_url` are `None` when the provider did
/// not return a usable value, which is a valid outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalProfile {
    pub external_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl CanonicalProfile {
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            email: None,
            avatar_url: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = non_blank(email);
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = non_blank(avatar_url);
        self
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
