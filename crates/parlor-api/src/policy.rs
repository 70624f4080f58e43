//! Authorization predicates.
//!
//! Each operation has one predicate over the actor's and target's role in
//! the group. They read no state of their own, so handlers fetch the roles
//! and ask here.

use parlor_types::models::Role;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Denied(pub &'static str);

pub type Decision = Result<(), Denied>;

pub fn require_participant(actor: Option<Role>) -> Decision {
    match actor {
        Some(_) => Ok(()),
        None => Err(Denied("You are not a participant of this group.")),
    }
}

pub fn require_moderator(actor: Option<Role>) -> Decision {
    match actor {
        Some(role) if role.is_moderator() => Ok(()),
        _ => Err(Denied("You do not have moderator status in this group.")),
    }
}

pub fn require_creator(actor: Option<Role>) -> Decision {
    match actor {
        Some(Role::Creator) => Ok(()),
        _ => Err(Denied("You do not have creator status in this group.")),
    }
}

/// Adding or removing `target`. Only the creator may remove a moderator;
/// nobody may remove the creator.
pub fn can_toggle_participant(actor: Option<Role>, target: Option<Role>) -> Decision {
    require_moderator(actor)?;
    match target {
        Some(Role::Creator) => Err(Denied("The creator cannot be removed from the group.")),
        Some(Role::Moderator) if actor != Some(Role::Creator) => {
            Err(Denied("You do not have the permission to remove another moderator."))
        }
        _ => Ok(()),
    }
}

/// Granting or revoking moderator status on `target`.
pub fn can_toggle_moderator(actor: Option<Role>, target: Option<Role>) -> Decision {
    require_creator(actor)?;
    match target {
        Some(Role::Creator) => Err(Denied("You cannot remove the creator's permissions.")),
        None => Err(Denied("Only participants can be given moderator status.")),
        Some(_) => Ok(()),
    }
}

pub fn require_sender(actor: Uuid, sender: Uuid) -> Decision {
    if actor == sender {
        Ok(())
    } else {
        Err(Denied("You are not the sender of this message."))
    }
}

/// A request naming a user id must come from that user.
pub fn authorize_client(claimed_user_id: Uuid, authenticated: Uuid) -> bool {
    claimed_user_id == authenticated
}
