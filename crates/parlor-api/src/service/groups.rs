use std::collections::HashSet;

use tracing::{error, info};
use uuid::Uuid;

use parlor_db::NewGroup;
use parlor_types::api::{
    CreateGroupRequest, CreateGroupResponse, DeleteGroupResponse, ImageResponse, ImageUpload,
    MembershipResponse,
};
use parlor_types::models::{Group, Member, Role};

use super::{ChatService, decode_image, parse_id, to_profile};
use crate::error::{ApiError, ApiResult};
use crate::policy;

const MAX_TITLE_CHARS: usize = 100;

impl ChatService {
    /// The creator is always stored as `Creator`; listed moderators join as
    /// moderators, everyone else as participants.
    pub fn create_group(&self, creator: Uuid, req: CreateGroupRequest) -> ApiResult<CreateGroupResponse> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(ApiError::validation("Group title can't be empty."));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::validation("Group title is too long."));
        }
        self.require_account(creator)?;

        let moderators: HashSet<Uuid> = req.moderators.iter().copied().collect();
        let mut seen = HashSet::from([creator]);
        let mut members = Vec::new();
        for user_id in req.participants.iter().chain(req.moderators.iter()) {
            if !seen.insert(*user_id) {
                continue;
            }
            self.require_user(*user_id)?;
            let role = if moderators.contains(user_id) {
                Role::Moderator
            } else {
                Role::Participant
            };
            members.push((user_id.to_string(), role));
        }

        let image = req.image.as_ref().map(decode_image).transpose()?;
        let group_id = Uuid::new_v4();
        self.db.create_group(NewGroup {
            id: group_id.to_string(),
            title: title.to_string(),
            creator_id: creator.to_string(),
            members,
            image,
        })?;

        info!("Group {} '{}' created by {}", group_id, title, creator);
        Ok(CreateGroupResponse {
            id: group_id,
            title: title.to_string(),
            creator,
        })
    }

    pub fn get_group_info(&self, group_id: Uuid) -> ApiResult<Group> {
        let group = self.require_group(group_id)?;
        let rows = self.db.get_members(&group.id)?;

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let role: Role = row
                .role
                .parse()
                .map_err(|e: String| ApiError::Store(anyhow::anyhow!(e)))?;
            members.push(Member {
                profile: to_profile(row.profile),
                role,
            });
        }

        let creator_id = parse_id(&group.creator_id, "user");
        let creator = match members.iter().find(|m| m.profile.id == creator_id) {
            Some(m) => m.profile.clone(),
            None => to_profile(
                self.db
                    .get_profile(&group.creator_id)?
                    .ok_or_else(|| ApiError::not_found("User", creator_id))?,
            ),
        };

        Ok(Group {
            id: group_id,
            title: group.title,
            image_id: group.image_id.as_deref().map(|i| parse_id(i, "image")),
            creator,
            members,
            created_at: parlor_db::micros_to_datetime(group.created_at),
            updated_at: parlor_db::micros_to_datetime(group.updated_at),
        })
    }

    /// Add `target` as a participant, or remove them (and any moderator
    /// status) if they already belong to the group.
    pub fn toggle_participant(&self, actor: Uuid, group_id: Uuid, target: Uuid) -> ApiResult<MembershipResponse> {
        let actor_role = self.actor_role_in(group_id, actor)?;
        let target_role = self.role_in(group_id, target)?;
        policy::can_toggle_participant(actor_role, target_role)?;

        let gid = group_id.to_string();
        let uid = target.to_string();
        let role = match target_role {
            None => {
                self.require_user(target)?;
                self.db.add_participant(&gid, &uid)?;
                info!("{} added {} to group {}", actor, target, group_id);
                Some(Role::Participant)
            }
            Some(_) => {
                self.db.remove_participant(&gid, &uid)?;
                info!("{} removed {} from group {}", actor, target, group_id);
                None
            }
        };

        Ok(MembershipResponse {
            group_id,
            user_id: target,
            role,
        })
    }

    /// Promote a participant to moderator or demote a moderator.
    pub fn toggle_moderator(&self, actor: Uuid, group_id: Uuid, target: Uuid) -> ApiResult<MembershipResponse> {
        let actor_role = self.actor_role_in(group_id, actor)?;
        let target_role = self.role_in(group_id, target)?;
        policy::can_toggle_moderator(actor_role, target_role)?;

        let next = match target_role {
            Some(Role::Moderator) => Role::Participant,
            _ => Role::Moderator,
        };
        self.db
            .set_role(&group_id.to_string(), &target.to_string(), next)?;
        info!("{} set {} to {} in group {}", actor, target, next, group_id);

        Ok(MembershipResponse {
            group_id,
            user_id: target,
            role: Some(next),
        })
    }

    /// Creator-only. Removes the group with its messages and images.
    pub fn delete_group(&self, actor: Uuid, group_id: Uuid) -> ApiResult<DeleteGroupResponse> {
        policy::require_creator(self.actor_role_in(group_id, actor)?)?;

        let report = self
            .db
            .delete_group_cascade(&group_id.to_string())
            .map_err(|e| {
                error!("Deleting group {} aborted, nothing removed: {:#}", group_id, e);
                ApiError::Store(e)
            })?;

        Ok(DeleteGroupResponse {
            group_id,
            deleted_messages: report.messages,
            deleted_images: report.images,
        })
    }

    pub fn set_group_image(&self, actor: Uuid, group_id: Uuid, upload: ImageUpload) -> ApiResult<ImageResponse> {
        policy::require_moderator(self.actor_role_in(group_id, actor)?)?;
        let image = decode_image(&upload)?;
        let image_id = self.db.set_group_image(&group_id.to_string(), image)?;
        Ok(ImageResponse {
            image_id: parse_id(&image_id, "image"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use parlor_types::api::SendMessageRequest;

    #[test]
    fn create_group_assigns_roles() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let carol = fixtures::user(&chat, "carol");

        let created = chat
            .create_group(
                alice,
                CreateGroupRequest {
                    title: "  hikers ".into(),
                    participants: vec![alice, bob, carol],
                    moderators: vec![carol],
                    image: Some(fixtures::png()),
                },
            )
            .unwrap();
        assert_eq!(created.title, "hikers");

        let info = chat.get_group_info(created.id).unwrap();
        assert_eq!(info.creator.id, alice);
        assert!(info.image_id.is_some());
        let role_of = |id: Uuid| info.members.iter().find(|m| m.profile.id == id).map(|m| m.role);
        assert_eq!(role_of(alice), Some(Role::Creator));
        assert_eq!(role_of(bob), Some(Role::Participant));
        assert_eq!(role_of(carol), Some(Role::Moderator));
        assert_eq!(info.moderators().count(), 2);

        // Membership shows up on the user side too.
        assert_eq!(chat.get_user(bob).unwrap().groups[0].id, created.id);
    }

    #[test]
    fn create_group_validates_input() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");

        let empty = chat.create_group(
            alice,
            CreateGroupRequest { title: "   ".into(), participants: vec![], moderators: vec![], image: None },
        );
        assert!(matches!(empty, Err(ApiError::Validation(_))));

        let stranger = chat.create_group(
            alice,
            CreateGroupRequest { title: "x".into(), participants: vec![Uuid::new_v4()], moderators: vec![], image: None },
        );
        assert!(matches!(stranger, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn moderators_manage_participants() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let carol = fixtures::user(&chat, "carol");
        let group = fixtures::group(&chat, alice, &[bob]);

        // A plain participant cannot add anyone.
        assert!(matches!(chat.toggle_participant(bob, group, carol), Err(ApiError::Permission(_))));

        chat.toggle_moderator(alice, group, bob).unwrap();
        let added = chat.toggle_participant(bob, group, carol).unwrap();
        assert_eq!(added.role, Some(Role::Participant));
        assert_eq!(chat.get_user(carol).unwrap().groups.len(), 1);

        let removed = chat.toggle_participant(bob, group, carol).unwrap();
        assert_eq!(removed.role, None);
        assert!(chat.get_user(carol).unwrap().groups.is_empty());
    }

    #[test]
    fn removing_a_moderator_drops_both_roles() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let group = fixtures::group(&chat, alice, &[bob]);

        chat.toggle_moderator(alice, group, bob).unwrap();
        assert_eq!(chat.toggle_participant(alice, group, bob).unwrap().role, None);

        // Re-adding brings them back as a plain participant.
        assert_eq!(chat.toggle_participant(alice, group, bob).unwrap().role, Some(Role::Participant));
    }

    #[test]
    fn creator_can_never_be_removed_or_demoted() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let outsider = fixtures::user(&chat, "dave");
        let group = fixtures::group(&chat, alice, &[bob]);
        chat.toggle_moderator(alice, group, bob).unwrap();

        for actor in [alice, bob, outsider] {
            assert!(matches!(chat.toggle_participant(actor, group, alice), Err(ApiError::Permission(_))));
            assert!(matches!(chat.toggle_moderator(actor, group, alice), Err(ApiError::Permission(_))));
        }
        let info = chat.get_group_info(group).unwrap();
        assert_eq!(info.members[0].profile.id, alice);
        assert_eq!(info.members[0].role, Role::Creator);
    }

    #[test]
    fn only_creator_toggles_moderators() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let carol = fixtures::user(&chat, "carol");
        let group = fixtures::group(&chat, alice, &[bob, carol]);

        chat.toggle_moderator(alice, group, bob).unwrap();
        assert!(matches!(chat.toggle_moderator(bob, group, carol), Err(ApiError::Permission(_))));
        // Moderators cannot remove each other either.
        chat.toggle_moderator(alice, group, carol).unwrap();
        assert!(matches!(chat.toggle_participant(bob, group, carol), Err(ApiError::Permission(_))));

        assert_eq!(chat.toggle_moderator(alice, group, bob).unwrap().role, Some(Role::Participant));
    }

    #[test]
    fn delete_group_cascades() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let group = fixtures::group(&chat, alice, &[bob]);
        chat.set_group_image(alice, group, fixtures::png()).unwrap();

        let mut image_ids = Vec::new();
        for i in 0..5 {
            let images = if i % 2 == 0 { vec![fixtures::png()] } else { vec![] };
            let sent = chat
                .send_message(
                    bob,
                    group,
                    SendMessageRequest { body: format!("m{}", i), kind: None, images, reply_to: None },
                )
                .unwrap();
            image_ids.extend(sent.images.iter().map(|i| i.id));
        }
        chat.touch_visit(bob, group).unwrap();
        assert_eq!(image_ids.len(), 3);

        assert!(matches!(chat.delete_group(bob, group), Err(ApiError::Permission(_))));

        let report = chat.delete_group(alice, group).unwrap();
        assert_eq!(report.deleted_messages, 5);
        // Three message images and the group image.
        assert_eq!(report.deleted_images, 4);

        for id in image_ids {
            assert!(matches!(chat.get_image(id), Err(ApiError::NotFound(_))));
        }
        assert!(matches!(chat.get_group_info(group), Err(ApiError::NotFound(_))));
        assert!(chat.get_user(bob).unwrap().groups.is_empty());
        assert_eq!(chat.db().count_messages(&group.to_string()).unwrap(), 0);
    }

    #[test]
    fn group_image_needs_moderator_and_replaces_in_place() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let group = fixtures::group(&chat, alice, &[bob]);

        assert!(matches!(chat.set_group_image(bob, group, fixtures::png()), Err(ApiError::Permission(_))));
        let first = chat.set_group_image(alice, group, fixtures::png()).unwrap();
        let second = chat.set_group_image(alice, group, fixtures::png()).unwrap();
        assert_eq!(first.image_id, second.image_id);
        assert_eq!(chat.get_group_info(group).unwrap().image_id, Some(first.image_id));
    }

    #[test]
    fn unknown_group_is_not_found() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let missing = Uuid::new_v4();
        assert!(matches!(chat.get_group_info(missing), Err(ApiError::NotFound(_))));
        assert!(matches!(chat.delete_group(alice, missing), Err(ApiError::NotFound(_))));
        assert!(matches!(chat.toggle_participant(alice, missing, alice), Err(ApiError::NotFound(_))));
    }
}
