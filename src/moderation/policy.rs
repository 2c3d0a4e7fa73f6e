/// Role-scoped access policy shared by the report and appeal lifecycles.
///
/// `can_access` is the base rule: owners may touch their own records and
/// moderators/administrators may touch any record. Every operation-specific
/// rule is an `Access` variant evaluated by `permits`, which narrows that
/// base rule.
use super::actor::{Actor, Role};
use super::appeals::AppealStatus;
use crate::error::{ModerationError, ModResult};

/// Self-access for the owning member, full access for staff.
pub fn can_access(actor_id: &str, owner_id: &str, role: Role) -> bool {
    role.is_staff() || (!actor_id.is_empty() && actor_id == owner_id)
}

/// What an operation needs from its actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    /// Read a record owned by `owner_id`
    Read { owner_id: &'a str },
    /// Moderator-or-above, ownership irrelevant
    Moderate,
    /// Administrator only
    Administer,
    /// Only the owner, acting for themselves; staff get no override
    OnBehalfOf { owner_id: &'a str },
    /// Patch an appeal; `narrative_only` is true when the patch touches
    /// nothing but `appeal_reason`
    EditAppeal {
        owner_id: &'a str,
        status: AppealStatus,
        narrative_only: bool,
    },
}

impl Access<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Access::Read { .. } => "read this record",
            Access::Moderate => "moderate (moderator role or higher required)",
            Access::Administer => "perform this action (administrator role required)",
            Access::OnBehalfOf { .. } => "act on behalf of another member",
            Access::EditAppeal { .. } => "edit these appeal fields",
        }
    }
}

/// Evaluate an access requirement
pub fn permits(actor: &Actor, access: Access<'_>) -> bool {
    match access {
        Access::Read { owner_id } => can_access(&actor.id, owner_id, actor.role),
        Access::Moderate => actor.role.can_act_as(Role::Moderator),
        Access::Administer => actor.role.can_act_as(Role::Administrator),
        Access::OnBehalfOf { owner_id } => can_access(&actor.id, owner_id, Role::Member),
        Access::EditAppeal {
            owner_id,
            status,
            narrative_only,
        } => {
            actor.role.is_staff()
                || (can_access(&actor.id, owner_id, Role::Member)
                    && status == AppealStatus::Pending
                    && narrative_only)
        }
    }
}

/// Like `permits`, but fails with `Forbidden`
pub fn authorize(actor: &Actor, access: Access<'_>) -> ModResult<()> {
    if permits(actor, access) {
        Ok(())
    } else {
        tracing::warn!(
            actor = %actor.id,
            role = actor.role.as_str(),
            ?access,
            "access denied"
        );
        Err(ModerationError::Forbidden(format!(
            "{} ({}) may not {}",
            actor.id,
            actor.role.as_str(),
            access.describe()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_access_base_rule() {
        assert!(can_access("m1", "m1", Role::Member));
        assert!(!can_access("m2", "m1", Role::Member));
        assert!(can_access("mod", "m1", Role::Moderator));
        assert!(can_access("admin", "m1", Role::Administrator));
        assert!(!can_access("", "", Role::Member));
    }

    #[test]
    fn test_read_access() {
        let owner = Actor::member("m1");
        let other = Actor::member("m2");
        let moderator = Actor::moderator("mod");

        assert!(permits(&owner, Access::Read { owner_id: "m1" }));
        assert!(!permits(&other, Access::Read { owner_id: "m1" }));
        assert!(permits(&moderator, Access::Read { owner_id: "m1" }));
    }

    #[test]
    fn test_moderate_and_administer() {
        assert!(!permits(&Actor::member("m1"), Access::Moderate));
        assert!(permits(&Actor::moderator("mod"), Access::Moderate));
        assert!(permits(&Actor::administrator("admin"), Access::Moderate));

        assert!(!permits(&Actor::moderator("mod"), Access::Administer));
        assert!(permits(&Actor::administrator("admin"), Access::Administer));
    }

    #[test]
    fn test_on_behalf_of_has_no_staff_override() {
        assert!(permits(&Actor::member("m1"), Access::OnBehalfOf { owner_id: "m1" }));
        assert!(!permits(
            &Actor::administrator("admin"),
            Access::OnBehalfOf { owner_id: "m1" }
        ));
    }

    #[test]
    fn test_edit_appeal_rules() {
        let owner = Actor::member("m1");
        let pending_narrative = Access::EditAppeal {
            owner_id: "m1",
            status: AppealStatus::Pending,
            narrative_only: true,
        };
        let reviewed_narrative = Access::EditAppeal {
            owner_id: "m1",
            status: AppealStatus::UnderReview,
            narrative_only: true,
        };
        let pending_status_change = Access::EditAppeal {
            owner_id: "m1",
            status: AppealStatus::Pending,
            narrative_only: false,
        };

        assert!(permits(&owner, pending_narrative));
        assert!(!permits(&owner, reviewed_narrative));
        assert!(!permits(&owner, pending_status_change));
        assert!(!permits(&Actor::member("m2"), pending_narrative));
        assert!(permits(&Actor::moderator("mod"), reviewed_narrative));
        assert!(permits(&Actor::moderator("mod"), pending_status_change));
    }

    #[test]
    fn test_authorize_returns_forbidden() {
        let err = authorize(&Actor::member("m2"), Access::Read { owner_id: "m1" }).unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));
        assert!(authorize(&Actor::member("m1"), Access::Read { owner_id: "m1" }).is_ok());
    }
}
