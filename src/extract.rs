//! Snapshot extraction from the `GetUserStatus` response.
//!
//! The response schema belongs to the language server and is not validated. Every
//! DTO field deserializes leniently: a missing or mistyped field becomes its default
//! and the rest of the record still loads.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{ModelQuota, UserInfo};
use crate::utils::{deserialize_lenient, deserialize_non_empty};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanInfoDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    plan_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    teams_tier: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    monthly_prompt_credits: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    monthly_flow_credits: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanStatusDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    plan_info: Option<PlanInfoDto>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    available_prompt_credits: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    available_flow_credits: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelOrAliasDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaInfoDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    remaining_fraction: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    reset_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientModelConfigDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    label: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    model_or_alias: Option<ModelOrAliasDto>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    quota_info: Option<QuotaInfoDto>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    is_recommended: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    supports_images: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CascadeModelConfigDataDto {
    /// Kept as raw values so one malformed config does not drop the others
    #[serde(default, deserialize_with = "deserialize_lenient")]
    client_model_configs: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStatusDto {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    plan_status: Option<PlanStatusDto>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    cascade_model_config_data: Option<CascadeModelConfigDataDto>,
}

/// The `userStatus` object, or the root itself when the wrapper is missing.
fn user_status(data: &Value) -> UserStatusDto {
    let node = data.get("userStatus").unwrap_or(data);
    UserStatusDto::deserialize(node).unwrap_or_default()
}

/// Account identity, plan and credits with `N/A` fallbacks for text fields.
pub fn extract_user_info(data: &Value) -> UserInfo {
    let us = user_status(data);
    let plan_status = us.plan_status.unwrap_or_default();
    let plan_info = plan_status.plan_info.unwrap_or_default();

    UserInfo {
        name: us.name.unwrap_or_else(|| "N/A".to_string()),
        email: us.email.unwrap_or_else(|| "N/A".to_string()),
        plan: plan_info
            .plan_name
            .or(plan_info.teams_tier)
            .unwrap_or_else(|| "N/A".to_string()),
        prompt_credits: plan_status.available_prompt_credits,
        flow_credits: plan_status.available_flow_credits,
        monthly_prompt_credits: plan_info.monthly_prompt_credits,
        monthly_flow_credits: plan_info.monthly_flow_credits,
    }
}

/// Per-model quota configs in response order.
pub fn extract_models(data: &Value) -> Vec<ModelQuota> {
    let configs = user_status(data)
        .cascade_model_config_data
        .and_then(|c| c.client_model_configs)
        .unwrap_or_default();

    configs
        .iter()
        .map(|raw| {
            let cfg = ClientModelConfigDto::deserialize(raw).unwrap_or_default();
            let quota = cfg.quota_info.unwrap_or_default();
            ModelQuota {
                label: cfg.label.unwrap_or_else(|| "Unknown".to_string()),
                model_id: cfg.model_or_alias.and_then(|m| m.model).unwrap_or_default(),
                remaining_fraction: quota.remaining_fraction,
                reset_time: quota.reset_time,
                is_recommended: cfg.is_recommended.unwrap_or(false),
                supports_images: cfg.supports_images.unwrap_or(false),
            }
        })
        .collect()
}

/// Top-level keys of the response, for diagnosing an unexpected shape.
pub fn response_keys(data: &Value) -> Vec<String> {
    data.as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "userStatus": {
                "name": "Ada",
                "email": "ada@example.com",
                "planStatus": {
                    "planInfo": {
                        "teamsTier": "TEAMS_TIER_PRO",
                        "monthlyPromptCredits": 500,
                        "monthlyFlowCredits": 1000
                    },
                    "availablePromptCredits": 420,
                    "availableFlowCredits": 880.5
                },
                "cascadeModelConfigData": {
                    "clientModelConfigs": [
                        {
                            "label": "Gemini 3 Pro",
                            "modelOrAlias": {"model": "MODEL_PLACEHOLDER_M7"},
                            "quotaInfo": {"remainingFraction": 0.75, "resetTime": "2025-03-01T12:00:00Z"},
                            "isRecommended": true
                        },
                        {
                            "label": "Claude Sonnet",
                            "quotaInfo": {},
                            "supportsImages": true
                        },
                        "garbage"
                    ]
                }
            }
        })
    }

    #[test]
    fn test_extract_user_info_falls_back_to_teams_tier() {
        let user = extract_user_info(&sample());
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.plan, "TEAMS_TIER_PRO");
        assert_eq!(user.prompt_credits, Some(420.0));
        assert_eq!(user.flow_credits, Some(880.5));
        assert_eq!(user.monthly_prompt_credits, Some(500.0));
        assert_eq!(user.monthly_flow_credits, Some(1000.0));
    }

    #[test]
    fn test_extract_models_keeps_unknown_fraction_distinct_from_zero() {
        let models = extract_models(&sample());
        assert_eq!(models.len(), 3);

        assert_eq!(models[0].label, "Gemini 3 Pro");
        assert_eq!(models[0].model_id, "MODEL_PLACEHOLDER_M7");
        assert_eq!(models[0].remaining_fraction, Some(0.75));
        assert_eq!(models[0].reset_time.as_deref(), Some("2025-03-01T12:00:00Z"));
        assert!(models[0].is_recommended);
        assert!(!models[0].supports_images);

        assert_eq!(models[1].remaining_fraction, None);
        assert_eq!(models[1].reset_time, None);
        assert_eq!(models[1].model_id, "");
        assert!(models[1].supports_images);

        assert_eq!(models[2].label, "Unknown");
        assert_eq!(models[2].remaining_fraction, None);
    }

    #[test]
    fn test_missing_wrapper_reads_root() {
        let data = json!({"email": "root@example.com", "planStatus": {"availablePromptCredits": 3}});
        let user = extract_user_info(&data);
        assert_eq!(user.email, "root@example.com");
        assert_eq!(user.name, "N/A");
        assert_eq!(user.plan, "N/A");
        assert_eq!(user.prompt_credits, Some(3.0));
        assert_eq!(user.flow_credits, None);
        assert!(extract_models(&data).is_empty());
    }

    #[test]
    fn test_malformed_fields_degrade_individually() {
        let data = json!({
            "userStatus": {
                "name": 42,
                "email": "x@y.z",
                "planStatus": {"planInfo": "oops", "availableFlowCredits": "many"},
                "cascadeModelConfigData": {"clientModelConfigs": {"not": "a list"}}
            }
        });
        let user = extract_user_info(&data);
        assert_eq!(user.name, "N/A");
        assert_eq!(user.email, "x@y.z");
        assert_eq!(user.plan, "N/A");
        assert_eq!(user.flow_credits, None);
        assert!(extract_models(&data).is_empty());

        assert!(extract_models(&json!("not even an object")).is_empty());
        assert_eq!(response_keys(&data), vec!["userStatus".to_string()]);
    }
}
