//! Typed views over the `GetUserStatus` response.

/// Per-model quota as reported by the language server
#[derive(Debug, Clone, PartialEq)]
pub struct ModelQuota {
    pub label: String,
    pub model_id: String,
    /// Remaining quota in 0.0..=1.0; `None` means unknown, not depleted
    pub remaining_fraction: Option<f64>,
    pub reset_time: Option<String>,
    pub is_recommended: bool,
    pub supports_images: bool,
}

/// Account identity, plan and credit balances
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub name: String,
    pub email: String,
    pub plan: String,
    pub prompt_credits: Option<f64>,
    pub flow_credits: Option<f64>,
    pub monthly_prompt_credits: Option<f64>,
    pub monthly_flow_credits: Option<f64>,
}
