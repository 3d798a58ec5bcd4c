//! Public projection builder.
//!
//! Turns the authoritative state into the redacted view that untrusted
//! public viewers receive. Pure; the host re-runs it after every state
//! change and pushes the result to each public connection.

use sync_types::{FullState, Player, PublicState};

/// Build the public projection of `full`.
///
/// The result never contains an archived tournament, a non-empty player
/// `notes`, or any print target.
pub fn to_public_state(full: &FullState) -> PublicState {
    PublicState {
        tournaments: full
            .tournaments
            .iter()
            .filter(|t| !t.is_archived)
            .cloned()
            .collect(),
        players: full.players.iter().map(redact_player).collect(),
        seasons: full.seasons.clone(),
        cash_game_tables: full.cash_game_tables.clone(),
        cash_game_sessions: full.cash_game_sessions.clone(),
    }
}

fn redact_player(player: &Player) -> Player {
    let mut fields = player.fields.clone();
    // reducers may write `notes` straight into the opaque map
    fields.remove("notes");
    Player {
        id: player.id.clone(),
        notes: String::new(),
        fields,
    }
}
