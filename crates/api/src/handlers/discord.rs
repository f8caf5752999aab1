//! Public Discord community widget.

use axum::{
    Json, Router, debug_handler, extract::State, http::StatusCode, response::IntoResponse,
    routing::get,
};
use serde_json::Value;

use crate::{error::AppError, services::webhook_settings, state::AppState};

/// Widget data stays cached for five minutes - including a miss, so a
/// down or private guild is not hammered on every page load.
const WIDGET_TTL_SECS: i64 = 300;

pub fn router() -> Router<AppState> {
    Router::new().route("/widget", get(widget))
}

#[debug_handler]
async fn widget(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let settings = webhook_settings(&state).await?;
    let Some(server_id) = settings.server_id else {
        return Err(AppError::External(
            StatusCode::NOT_FOUND,
            "Discord server not configured",
        ));
    };

    let discord = state.discord.clone();
    let cache_key = format!("discord:widget:{}", server_id);

    let widget: Option<Value> = state
        .stores
        .cache
        .get_or_compute(&cache_key, WIDGET_TTL_SECS, &["discord"], || async move {
            Ok(discord.fetch_widget(&server_id).await)
        })
        .await?;

    match widget {
        Some(data) => Ok(Json(data)),
        None => Err(AppError::External(
            StatusCode::NOT_FOUND,
            "Discord widget unavailable",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::MockSiteConfigRepo;
    use crate::services::MockDiscordNotifier;
    use crate::test_utils::TestStateBuilder;
    use serde_json::json;

    fn site_config_with_server() -> MockSiteConfigRepo {
        let mut site_config = MockSiteConfigRepo::new();
        site_config.expect_get().returning(|key| {
            Ok(match key {
                "discord_server_id" => Some("123456789".to_string()),
                _ => None,
            })
        });
        site_config
    }

    #[tokio::test]
    async fn widget_404s_when_no_server_configured() {
        let state = TestStateBuilder::new().build();

        let result = widget(State(state)).await;

        let Err(AppError::External(status, message)) = result else {
            panic!("expected external error");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Discord server not configured");
    }

    #[tokio::test]
    async fn widget_returns_guild_data() {
        let mut discord = MockDiscordNotifier::new();
        discord
            .expect_fetch_widget()
            .withf(|server_id| server_id == "123456789")
            .returning(|_| Some(json!({"name": "Hearth", "presence_count": 42})));

        let state = TestStateBuilder::new()
            .with_site_config_repo(site_config_with_server())
            .with_discord(discord)
            .build();

        let response = widget(State(state)).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn widget_is_served_from_cache_on_repeat() {
        let mut discord = MockDiscordNotifier::new();
        discord
            .expect_fetch_widget()
            .times(1)
            .returning(|_| Some(json!({"name": "Hearth"})));

        let state = TestStateBuilder::new()
            .with_site_config_repo(site_config_with_server())
            .with_discord(discord)
            .build();

        for _ in 0..3 {
            widget(State(state.clone())).await.unwrap();
        }
    }

    #[tokio::test]
    async fn unavailable_widget_is_404() {
        let mut discord = MockDiscordNotifier::new();
        discord.expect_fetch_widget().returning(|_| None);

        let state = TestStateBuilder::new()
            .with_site_config_repo(site_config_with_server())
            .with_discord(discord)
            .build();

        let result = widget(State(state)).await;

        let Err(AppError::External(status, message)) = result else {
            panic!("expected external error");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Discord widget unavailable");
    }
}
