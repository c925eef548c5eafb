//! Messages from promoted participants and the broadcasts they cause.

use crate::config::duration_millis;
use crate::domain::{
    ChatBubble, ConnectionId, SlotRef,
    messages::{
        CHANGE_POSITION, CHANGE_POSITION_SCHEMA, CHAT, CHAT_SCHEMA, ChangePositionPayload,
        ChatPayload, LOGIN, SYN, SYN_SCHEMA, SynPayload,
    },
    schema::validate_as,
    session_table::Vacated,
};
use crate::infrastructure::dto::websocket::{InboundEnvelope, PlayerInfo, ServerEvent};

use super::lobby::{Lobby, send_event};

impl Lobby {
    pub(super) fn handle_session_message(
        &mut self,
        connection_id: ConnectionId,
        slot: SlotRef,
        envelope: &InboundEnvelope,
        now: i64,
    ) {
        let result = match envelope.event.as_str() {
            CHANGE_POSITION => validate_as::<ChangePositionPayload>(&CHANGE_POSITION_SCHEMA, &envelope.data)
                .map(|payload| self.change_position(slot, payload)),
            CHAT => validate_as::<ChatPayload>(&CHAT_SCHEMA, &envelope.data)
                .map(|payload| self.chat(slot, payload, now)),
            SYN => validate_as::<SynPayload>(&SYN_SCHEMA, &envelope.data).map(|payload| {
                self.send(
                    connection_id,
                    &ServerEvent::Ack {
                        mytime: payload.mytime,
                        servertime: now,
                    },
                )
            }),
            LOGIN => {
                self.protocol_violation(connection_id, "already logged in");
                return;
            }
            other => {
                self.protocol_violation(connection_id, &format!("unknown event '{other}'"));
                return;
            }
        };

        if let Err(e) = result {
            self.protocol_violation(connection_id, &e.to_string());
        }
    }

    fn change_position(&mut self, slot: SlotRef, payload: ChangePositionPayload) {
        let Some(presence) = self.sessions.presence_mut(slot) else {
            return;
        };
        presence.posx = payload.posx;
        presence.posy = payload.posy;
        presence.tarx = payload.tarx;
        presence.tary = payload.tary;

        self.broadcast(
            &ServerEvent::PositionChanged {
                local_index: slot.index,
                posx: payload.posx,
                posy: payload.posy,
                tarx: payload.tarx,
                tary: payload.tary,
            },
            Some(slot),
        );
    }

    fn chat(&mut self, slot: SlotRef, payload: ChatPayload, now: i64) {
        let expires_at = now.saturating_add(duration_millis(self.config.chat_ttl));
        let Some(presence) = self.sessions.presence_mut(slot) else {
            return;
        };
        presence.chat = Some(ChatBubble {
            msg: payload.msg.clone(),
            expires_at,
        });

        let account_id = self
            .sessions
            .get(slot)
            .map(|s| s.account_id().to_string())
            .unwrap_or_default();
        self.broadcast(
            &ServerEvent::Chat {
                local_index: slot.index,
                account_id,
                msg: payload.msg,
                expires_at,
            },
            None,
        );
    }

    /// Greet a newly seated participant and announce them to everyone else.
    pub(super) fn welcome(&self, slot: SlotRef) {
        let Some(session) = self.sessions.get(slot) else {
            return;
        };
        let players = self
            .sessions
            .occupied()
            .map(|(other, s)| PlayerInfo::from_slot(other, s))
            .collect();
        if let Some(connection) = session.connection() {
            send_event(
                connection,
                &ServerEvent::Admitted {
                    local_index: slot.index,
                    account_id: session.account_id().to_string(),
                    players,
                },
            );
        }

        self.broadcast(
            &ServerEvent::ParticipantJoined(PlayerInfo::from_slot(slot, session)),
            Some(slot),
        );
    }

    pub(super) fn announce_departure(&self, vacated: &Vacated) {
        self.broadcast(
            &ServerEvent::ParticipantLeft {
                local_index: vacated.local_index,
                account_id: vacated.account_id.clone(),
            },
            None,
        );
    }

    /// Send `event` to every seated participant except `skip`
    fn broadcast(&self, event: &ServerEvent, skip: Option<SlotRef>) {
        for (slot, session) in self.sessions.occupied() {
            if Some(slot) == skip {
                continue;
            }
            if let Some(connection) = session.connection() {
                send_event(connection, event);
            }
        }
    }
}
