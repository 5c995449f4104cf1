use crate::core::state::AppState;

/// Pings both persistence backends; returns the first failure as text.
pub(crate) async fn ping(state: &AppState) -> Result<(), String> {
    state.store().health().await.map_err(|err| format!("document store: {err}"))?;
    state.identity().health().await.map_err(|err| format!("identity store: {err}"))?;
    Ok(())
}
