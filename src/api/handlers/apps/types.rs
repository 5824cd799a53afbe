use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::apps::{AppRegistration, AppStats, AppStatus, NewApp};

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterAppRequest {
    pub app_name: String,
    pub app_url: String,
    pub description: String,
    pub contact_email: String,
    pub redirect_urls: Vec<String>,
    /// Defaults to `["read", "write"]`.
    pub permissions: Option<Vec<String>>,
}

impl From<RegisterAppRequest> for NewApp {
    fn from(request: RegisterAppRequest) -> Self {
        Self {
            app_name: request.app_name,
            app_url: request.app_url,
            description: request.description,
            contact_email: request.contact_email,
            redirect_urls: request.redirect_urls,
            permissions: request.permissions,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAppResponse {
    pub success: bool,
    pub registration: AppRegistration,
    pub next_steps: Vec<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct AppResponse {
    pub success: bool,
    pub app: AppRegistration,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct AppListResponse {
    pub success: bool,
    pub apps: Vec<AppRegistration>,
    pub stats: AppStats,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListAppsQuery {
    /// Only return registrations in this state.
    pub status: Option<AppStatus>,
    /// Case-insensitive match on name, description or contact email.
    pub q: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApproveAppRequest {
    pub approved_by: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct AppReasonRequest {
    pub reason: String,
}
