//! The concrete projections mirrored from the Client.

use std::sync::Arc;

use serde_json::Value;

use super::DataEngine;
use super::map::MapProjection;
use super::object::{ObjectProjection, ObjectRule, log_auth_challenges};
use super::projection::ProjectionContext;
use super::set::SetProjection;
use crate::client::process::Game;

pub const RSO_AUTHENTICATION_PATH: &str = "/rso-authenticator/v1/authentication";
pub const REGION_LOCALE_PATH: &str = "/riotclient/region-locale";
pub const PRODUCT_SESSIONS_PATH: &str = "/product-session/v1/sessions";
const MATCH_PATTERN: &str = r"^/riot-messaging-service/v1/messages/ares-core-game/core-game/v1/matches/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})$";

/// Typed handles to the registered projections.
#[derive(Clone)]
pub struct Managers {
    pub rso_authentication: Arc<ObjectProjection>,
    pub locale: Arc<ObjectProjection>,
    pub product_sessions: Arc<MapProjection>,
    pub valorant_matches: Arc<SetProjection>,
}

impl Managers {
    /// Product sessions belonging to `game`.
    #[must_use]
    pub fn sessions_for_game(&self, game: Game) -> Vec<Value> {
        self.product_sessions.values_where("productId", game.internal_name())
    }
}

/// Build the engine with every standard projection registered.
///
/// # Errors
///
/// Returns an error if a projection pattern fails to compile.
pub fn standard_engine(ctx: &ProjectionContext) -> Result<(DataEngine, Managers), regex::Error> {
    let rso_authentication = Arc::new(
        ObjectProjection::new(
            "RSOAuthentication",
            &format!("^{RSO_AUTHENTICATION_PATH}$"),
            ObjectRule::Replace,
            ctx.clone(),
        )?
        .with_fetch(RSO_AUTHENTICATION_PATH)
        .with_inspect(log_auth_challenges),
    );
    let locale = Arc::new(ObjectProjection::new(
        "Locale",
        &format!("^{REGION_LOCALE_PATH}$"),
        ObjectRule::MergeKeys(&["locale"]),
        ctx.clone(),
    )?);
    let product_sessions = Arc::new(
        MapProjection::new("ProductSession", &format!("^{PRODUCT_SESSIONS_PATH}/(.*)$"), 1, ctx.clone())?
            .with_snapshot(PRODUCT_SESSIONS_PATH)
            .with_load(&format!("{PRODUCT_SESSIONS_PATH}/{{key}}")),
    );
    let valorant_matches = Arc::new(SetProjection::new("ValorantMatches", MATCH_PATTERN, 1)?);

    let mut engine = DataEngine::new();
    engine.register_object(rso_authentication.clone());
    engine.register_object(locale.clone());
    engine.register_map(product_sessions.clone());
    engine.register_set(valorant_matches.clone());

    Ok((engine, Managers { rso_authentication, locale, product_sessions, valorant_matches }))
}
