use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::info;
use uuid::Uuid;

use parlor_types::api::{
    ContactToggleResponse, GroupSummary, ImageResponse, ImageUpload, LatestMessage, LoginRequest,
    RegisterRequest, UserResponse,
};
use parlor_types::models::UserProfile;

use super::{ChatService, conflict_or_store, decode_image, parse_id, to_profile};
use crate::error::{ApiError, ApiResult};

const MAX_STATUS_CHARS: usize = 150;

impl ChatService {
    pub fn register(&self, req: RegisterRequest) -> ApiResult<Uuid> {
        validate_username(&req.username)?;
        validate_password(&req.password)?;
        if !req.email.contains('@') {
            return Err(ApiError::validation("Email address is not valid."));
        }

        if self.db.username_taken(&req.username)? {
            return Err(ApiError::Conflict("Username already exists".into()));
        }
        if self.db.email_taken(&req.email)? {
            return Err(ApiError::Conflict("Email already taken by another account".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let user_id = Uuid::new_v4();
        self.db
            .create_user(&user_id.to_string(), &req.username, &req.email, &password_hash)
            .map_err(|e| conflict_or_store(e, "Username or email already taken"))?;

        info!("Registered user {} ({})", req.username, user_id);
        Ok(user_id)
    }

    /// Check credentials; soft-deleted accounts never match.
    pub fn login(&self, req: LoginRequest) -> ApiResult<UserProfile> {
        if req.email.is_empty() {
            return Err(ApiError::validation("Email can't be empty!"));
        }
        let user = self
            .db
            .get_user_by_email(&req.email)?
            .ok_or(ApiError::Authentication)?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::Store(anyhow::anyhow!("Stored password hash unreadable: {}", e)))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Authentication)?;

        Ok(UserProfile {
            id: parse_id(&user.id, "user"),
            username: user.username,
            status: user.status,
            image_id: user.image_id.as_deref().map(|id| parse_id(id, "image")),
        })
    }

    /// Own profile with contacts and the groups the user belongs to.
    pub fn get_user(&self, user_id: Uuid) -> ApiResult<UserResponse> {
        let id = user_id.to_string();
        let user = self
            .db
            .get_user_by_id(&id)?
            .filter(|u| !u.deleted)
            .ok_or_else(|| ApiError::not_found("User", user_id))?;

        let contacts = self.db.get_contacts(&id)?.into_iter().map(to_profile).collect();
        let groups = self
            .db
            .get_user_groups(&id)?
            .into_iter()
            .map(|g| GroupSummary {
                id: parse_id(&g.id, "group"),
                title: g.title,
                image_id: g.image_id.as_deref().map(|i| parse_id(i, "image")),
                latest_message: match (g.latest_body, g.latest_sender, g.latest_at) {
                    (Some(body), Some(sender_username), Some(at)) => Some(LatestMessage {
                        body,
                        sender_username,
                        created_at: parlor_db::micros_to_datetime(at),
                    }),
                    _ => None,
                },
            })
            .collect();

        Ok(UserResponse {
            profile: UserProfile {
                id: user_id,
                username: user.username,
                status: user.status,
                image_id: user.image_id.as_deref().map(|i| parse_id(i, "image")),
            },
            email: user.email,
            contacts,
            groups,
        })
    }

    /// Returns false when the value was already set.
    pub fn set_status(&self, user_id: Uuid, status: &str) -> ApiResult<bool> {
        if status.chars().count() > MAX_STATUS_CHARS {
            return Err(ApiError::validation("Status is too long."));
        }
        self.require_user(user_id)?;
        Ok(self.db.set_status(&user_id.to_string(), status)?)
    }

    pub fn set_username(&self, user_id: Uuid, username: &str) -> ApiResult<bool> {
        validate_username(username)?;
        let current = self.require_user(user_id)?;
        if current.username == username {
            return Ok(false);
        }
        if self.db.username_taken(username)? {
            return Err(ApiError::Conflict("Username already exists".into()));
        }
        self.db
            .set_username(&user_id.to_string(), username)
            .map_err(|e| conflict_or_store(e, "Username already exists"))
    }

    pub fn set_password(&self, user_id: Uuid, current: &str, new: &str) -> ApiResult<()> {
        let user = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .filter(|u| !u.deleted)
            .ok_or_else(|| ApiError::not_found("User", user_id))?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::Store(anyhow::anyhow!("Stored password hash unreadable: {}", e)))?;
        Argon2::default()
            .verify_password(current.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Permission("Invalid current password!".into()))?;

        validate_password(new)?;
        let hash = hash_password(new)?;
        self.db.set_password_hash(&user.id, &hash)?;
        Ok(())
    }

    pub fn set_user_image(&self, user_id: Uuid, upload: ImageUpload) -> ApiResult<ImageResponse> {
        let image = decode_image(&upload)?;
        self.require_user(user_id)?;
        let image_id = self.db.set_user_image(&user_id.to_string(), image)?;
        Ok(ImageResponse {
            image_id: parse_id(&image_id, "image"),
        })
    }

    pub fn delete_user_image(&self, user_id: Uuid) -> ApiResult<()> {
        if !self.db.clear_user_image(&user_id.to_string())? {
            return Err(ApiError::NotFound("You have no profile image.".into()));
        }
        Ok(())
    }

    /// Soft delete: the row stays so messages and groups keep their sender.
    pub fn delete_account(&self, user_id: Uuid) -> ApiResult<()> {
        if !self.db.soft_delete_user(&user_id.to_string())? {
            return Err(ApiError::not_found("User", user_id));
        }
        info!("Account {} deleted", user_id);
        Ok(())
    }

    pub fn toggle_contact(&self, user_id: Uuid, contact_id: Uuid) -> ApiResult<ContactToggleResponse> {
        if user_id == contact_id {
            return Err(ApiError::validation("You can't add yourself as a contact."));
        }
        self.require_user(contact_id)?;
        let added = self
            .db
            .toggle_contact(&user_id.to_string(), &contact_id.to_string())?;
        Ok(ContactToggleResponse { contact_id, added })
    }
}

fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::validation("Username must be 3 to 32 characters."));
    }
    if username == "Deleted" {
        return Err(ApiError::validation("That username is reserved."));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.len() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters."));
    }
    Ok(())
}

// Hash password with Argon2id
fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Store(anyhow::anyhow!("Password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[test]
    fn register_rejects_duplicates_and_bad_input() {
        let chat = fixtures::service();
        fixtures::user(&chat, "alice");

        let dup_name = chat.register(RegisterRequest {
            username: "alice".into(),
            email: "other@example.com".into(),
            password: "long enough".into(),
        });
        assert!(matches!(dup_name, Err(ApiError::Conflict(_))));

        let dup_email = chat.register(RegisterRequest {
            username: "alicia".into(),
            email: "alice@example.com".into(),
            password: "long enough".into(),
        });
        assert!(matches!(dup_email, Err(ApiError::Conflict(_))));

        let short = chat.register(RegisterRequest {
            username: "al".into(),
            email: "al@example.com".into(),
            password: "long enough".into(),
        });
        assert!(matches!(short, Err(ApiError::Validation(_))));
    }

    #[test]
    fn login_checks_password() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");

        let ok = chat
            .login(LoginRequest { email: "alice@example.com".into(), password: "correct horse".into() })
            .unwrap();
        assert_eq!(ok.id, alice);

        let bad = chat.login(LoginRequest { email: "alice@example.com".into(), password: "wrong horse".into() });
        assert!(matches!(bad, Err(ApiError::Authentication)));
    }

    #[test]
    fn deleted_account_is_blanked_and_cannot_log_in() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let group = fixtures::group(&chat, alice, &[bob]);
        chat.set_user_image(alice, fixtures::png()).unwrap();

        chat.delete_account(alice).unwrap();

        let login = chat.login(LoginRequest { email: "alice@example.com".into(), password: "correct horse".into() });
        assert!(matches!(login, Err(ApiError::Authentication)));
        assert!(matches!(chat.get_user(alice), Err(ApiError::NotFound(_))));

        // The group still names the account as its creator.
        let info = chat.get_group_info(group).unwrap();
        assert_eq!(info.creator.username, "Deleted");
        assert!(info.creator.image_id.is_none());
    }

    #[test]
    fn deleted_account_loses_access_to_its_groups() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let carol = fixtures::user(&chat, "carol");
        let group = fixtures::group(&chat, alice, &[bob]);
        let sent = chat
            .send_message(bob, group, parlor_types::api::SendMessageRequest {
                body: "before".into(),
                kind: None,
                images: vec![],
                reply_to: None,
            })
            .unwrap();

        chat.delete_account(bob).unwrap();
        let again = parlor_types::api::SendMessageRequest {
            body: "after".into(),
            kind: None,
            images: vec![],
            reply_to: None,
        };
        assert!(matches!(chat.send_message(bob, group, again), Err(ApiError::Authentication)));
        assert!(matches!(chat.incremental_sync(bob, group), Err(ApiError::Authentication)));
        assert!(matches!(chat.paged_history(bob, group, 0, 20), Err(ApiError::Authentication)));
        assert!(matches!(chat.touch_visit(bob, group), Err(ApiError::Authentication)));
        assert!(matches!(chat.delete_message(bob, sent.id), Err(ApiError::Authentication)));
        assert!(matches!(chat.require_account(bob), Err(ApiError::Authentication)));

        chat.toggle_moderator(alice, group, bob).unwrap();
        chat.delete_account(alice).unwrap();
        assert!(matches!(chat.toggle_participant(alice, group, carol), Err(ApiError::Authentication)));
        assert!(matches!(chat.toggle_moderator(alice, group, bob), Err(ApiError::Authentication)));
        assert!(matches!(chat.set_group_image(alice, group, fixtures::png()), Err(ApiError::Authentication)));
        assert!(matches!(chat.delete_group(alice, group), Err(ApiError::Authentication)));
        assert!(matches!(
            chat.create_group(alice, parlor_types::api::CreateGroupRequest {
                title: "new".into(),
                participants: vec![],
                moderators: vec![],
                image: None,
            }),
            Err(ApiError::Authentication)
        ));

        // Nothing the deleted accounts attempted reached the store.
        assert!(chat.get_group_info(group).is_ok());
        assert_eq!(chat.db().count_messages(&group.to_string()).unwrap(), 1);
        assert!(chat.require_account(carol).is_ok());
    }

    #[test]
    fn deleted_contact_disappears_from_contact_lists() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        assert!(chat.toggle_contact(alice, bob).unwrap().added);

        chat.delete_account(bob).unwrap();
        assert!(chat.get_user(alice).unwrap().contacts.is_empty());
    }

    #[test]
    fn uniqueness_rejected_by_the_store_is_a_conflict() {
        let chat = fixtures::service();
        fixtures::user(&chat, "alice");

        // A concurrent registration that slipped past the pre-checks.
        let raced = chat
            .db()
            .create_user(&Uuid::new_v4().to_string(), "alice", "second@example.com", "hash")
            .unwrap_err();
        assert!(matches!(conflict_or_store(raced, "taken"), ApiError::Conflict(_)));

        let other = anyhow::anyhow!("disk I/O error");
        assert!(matches!(conflict_or_store(other, "taken"), ApiError::Store(_)));
    }

    #[test]
    fn profile_edits() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        fixtures::user(&chat, "bob");

        assert!(chat.set_status(alice, "reading").unwrap());
        assert!(!chat.set_status(alice, "reading").unwrap());
        assert!(matches!(chat.set_username(alice, "bob"), Err(ApiError::Conflict(_))));
        assert!(chat.set_username(alice, "alicia").unwrap());
        assert_eq!(chat.get_user(alice).unwrap().profile.username, "alicia");

        assert!(matches!(
            chat.set_password(alice, "nope nope", "new password"),
            Err(ApiError::Permission(_))
        ));
        chat.set_password(alice, "correct horse", "new password").unwrap();
        assert!(chat
            .login(LoginRequest { email: "alice@example.com".into(), password: "new password".into() })
            .is_ok());
    }

    #[test]
    fn user_view_lists_contacts_and_groups_with_latest_message() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        let bob = fixtures::user(&chat, "bob");
        let group = fixtures::group(&chat, alice, &[bob]);

        assert!(chat.toggle_contact(alice, bob).unwrap().added);
        chat.send_message(
            bob,
            group,
            parlor_types::api::SendMessageRequest {
                body: "hello".into(),
                kind: None,
                images: vec![],
                reply_to: None,
            },
        )
        .unwrap();

        let view = chat.get_user(alice).unwrap();
        assert_eq!(view.contacts.len(), 1);
        assert_eq!(view.contacts[0].id, bob);
        assert_eq!(view.groups.len(), 1);
        let latest = view.groups[0].latest_message.as_ref().unwrap();
        assert_eq!(latest.body, "hello");
        assert_eq!(latest.sender_username, "bob");

        assert!(matches!(chat.toggle_contact(alice, alice), Err(ApiError::Validation(_))));
        assert!(!chat.toggle_contact(alice, bob).unwrap().added);
    }

    #[test]
    fn user_image_delete_requires_an_image() {
        let chat = fixtures::service();
        let alice = fixtures::user(&chat, "alice");
        assert!(matches!(chat.delete_user_image(alice), Err(ApiError::NotFound(_))));
        chat.set_user_image(alice, fixtures::png()).unwrap();
        chat.delete_user_image(alice).unwrap();
        assert!(chat.get_user(alice).unwrap().profile.image_id.is_none());
    }
}
