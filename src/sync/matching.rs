//! Identity exchange right after the link comes up.
//!
//! The host listens first and answers; the guest announces first and then
//! listens. Either way both sides end with the same roster, host first.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

use crate::game::{LocalIdentity, Player, UserId};
use crate::message::{ControlKind, ControlMessage, Message};
use crate::transport::{MessengerError, ReliableMessenger};

/// Which side of the link this peer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Advertised and accepted the connection; deals the board.
    Host,
    /// Connected to the host.
    Guest,
}

/// Swap identities with the peer and return the roster, host first.
///
/// Waits at most the messenger's configured identity timeout for the peer.
pub async fn exchange_identities(
    messenger: &ReliableMessenger,
    local: &LocalIdentity,
    role: PeerRole,
) -> Result<Vec<Player>, MessengerError> {
    let bound = messenger.config().identity_timeout;
    let mut inbound = messenger.subscribe();
    let announce: Message = ControlMessage::new(
        local.id.clone(),
        ControlKind::Identity {
            player_name: local.name.clone(),
            user_avatar: local.avatar,
        },
    )
    .into();

    let roster = match role {
        PeerRole::Host => {
            let mut remote = wait_for_identity(&mut inbound, bound).await?;
            messenger.send(&announce).await?;
            remote.is_host = false;
            vec![local.to_player(true), remote]
        }
        PeerRole::Guest => {
            messenger.send(&announce).await?;
            let mut remote = wait_for_identity(&mut inbound, bound).await?;
            remote.is_host = true;
            vec![remote, local.to_player(false)]
        }
    };

    tracing::info!(
        ?role,
        host = %roster[0].id,
        guest = %roster[1].id,
        "identities exchanged"
    );
    Ok(roster)
}

async fn wait_for_identity(
    inbound: &mut broadcast::Receiver<Message>,
    bound: Duration,
) -> Result<Player, MessengerError> {
    let wait = async {
        loop {
            match inbound.recv().await {
                Ok(Message::Control(ControlMessage {
                    user_id,
                    kind:
                        ControlKind::Identity {
                            player_name,
                            user_avatar,
                        },
                    ..
                })) => return Ok(identity_player(user_id, player_name, user_avatar)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "identity wait lagged");
                }
                Err(RecvError::Closed) => return Err(MessengerError::Closed),
            }
        }
    };

    timeout(bound, wait)
        .await
        .map_err(|_| MessengerError::IdentityTimeout { timeout: bound })?
}

fn identity_player(id: UserId, name: String, avatar: char) -> Player {
    Player {
        id,
        name,
        avatar,
        score: 0,
        is_host: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SyncConfig;
    use crate::transport::MemoryLink;

    fn messengers(config: SyncConfig) -> (ReliableMessenger, ReliableMessenger) {
        let (a, b) = MemoryLink::pair(16);
        (
            ReliableMessenger::new(a, config.clone()).unwrap(),
            ReliableMessenger::new(b, config).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_both_sides_agree_on_roster() {
        let config = SyncConfig::default().fragment_delay(Duration::ZERO);
        let (host_link, guest_link) = messengers(config);
        let ana = LocalIdentity::new("host", "Ana", 'a');
        let bo = LocalIdentity::new("guest", "Bo", 'b');

        let (host_roster, guest_roster) = tokio::join!(
            exchange_identities(&host_link, &ana, PeerRole::Host),
            exchange_identities(&guest_link, &bo, PeerRole::Guest),
        );
        let host_roster = host_roster.unwrap();
        let guest_roster = guest_roster.unwrap();

        assert_eq!(host_roster, guest_roster);
        assert_eq!(host_roster[0], ana.to_player(true));
        assert_eq!(host_roster[1], bo.to_player(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_times_out_without_guest() {
        let config = SyncConfig::default().identity_timeout(Duration::from_secs(15));
        let (host_link, _guest_link) = messengers(config);
        let ana = LocalIdentity::new("host", "Ana", 'a');

        let err = exchange_identities(&host_link, &ana, PeerRole::Host)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MessengerError::IdentityTimeout { timeout } if timeout == Duration::from_secs(15)
        ));
    }
}
