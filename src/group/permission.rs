//! Permission evaluation for group actions.
//!
//! Evaluation is pure: the requester's capabilities and a group snapshot go
//! in, a boolean comes out.

use super::types::{Group, PermissionMode};
use crate::sender::MailSender;

/// Override node for sending to any group.
pub const NODE_SEND_ALL: &str = "mailbag.group.send-all";

/// Override node for modifying any group.
pub const NODE_MODIFY_ALL: &str = "mailbag.group.modify-all";

/// Override node for dissolving any group.
pub const NODE_DISSOLUTION_ALL: &str = "mailbag.group.dissolution-all";

/// Node lifting the per-owner group creation limit.
pub const NODE_CREATE_INFINITY: &str = "mailbag.group.create-infinity";

/// An action gated by a group's permission modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    /// Address mail to the group.
    Send,
    /// Change members, modes or owner.
    Modify,
    /// Delete the group.
    Dissolve,
}

impl GroupAction {
    /// Override node for this action.
    pub fn override_node(&self) -> &'static str {
        match self {
            GroupAction::Send => NODE_SEND_ALL,
            GroupAction::Modify => NODE_MODIFY_ALL,
            GroupAction::Dissolve => NODE_DISSOLUTION_ALL,
        }
    }

    /// The group's mode governing this action.
    pub fn mode_of(&self, group: &Group) -> PermissionMode {
        match self {
            GroupAction::Send => group.send_mode,
            GroupAction::Modify => group.modify_mode,
            GroupAction::Dissolve => group.dissolution_mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupAction::Send => "send",
            GroupAction::Modify => "modify",
            GroupAction::Dissolve => "dissolve",
        }
    }
}

/// Evaluator of group permission modes.
pub struct PermissionPolicy;

impl PermissionPolicy {
    /// Evaluate `mode` for `requester` against `group`.
    ///
    /// Holding `override_node` allows regardless of the mode, including
    /// `NEVER`.
    pub fn evaluate(
        requester: &dyn MailSender,
        mode: PermissionMode,
        override_node: &str,
        group: &Group,
    ) -> bool {
        if requester.has_permission(override_node) {
            return true;
        }
        match mode {
            PermissionMode::Never => false,
            PermissionMode::Op => requester.is_operator(),
            PermissionMode::Owner => group.owner == requester.identity_key(),
            PermissionMode::Member => group.is_member(&requester.identity_key()),
            PermissionMode::Everyone => true,
        }
    }

    /// Check if `requester` may perform `action` on `group`.
    pub fn can(requester: &dyn MailSender, action: GroupAction, group: &Group) -> bool {
        Self::evaluate(
            requester,
            action.mode_of(group),
            action.override_node(),
            group,
        )
    }

    /// Check if `requester` may create another group while owning `owned`.
    pub fn can_create(requester: &dyn MailSender, owned: usize, limit: usize) -> bool {
        requester.has_permission(NODE_CREATE_INFINITY) || owned < limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{ConsoleSender, PlaceholderSender, PlayerSender};
    use uuid::Uuid;

    const MODES: [PermissionMode; 5] = [
        PermissionMode::Never,
        PermissionMode::Op,
        PermissionMode::Owner,
        PermissionMode::Member,
        PermissionMode::Everyone,
    ];

    struct Roles {
        owner: PlayerSender,
        member: PlayerSender,
        outsider: PlayerSender,
        operator: PlayerSender,
    }

    fn setup() -> (Roles, Group) {
        let roles = Roles {
            owner: PlayerSender::new(Uuid::new_v4(), "owner"),
            member: PlayerSender::new(Uuid::new_v4(), "member"),
            outsider: PlayerSender::new(Uuid::new_v4(), "outsider"),
            operator: PlayerSender::new(Uuid::new_v4(), "op").with_operator(true),
        };
        let mut group = Group::new(
            "Team",
            roles.owner.identity_key(),
            PermissionMode::Member,
            PermissionMode::Owner,
            PermissionMode::Owner,
        );
        group.members.insert(roles.member.identity_key());
        (roles, group)
    }

    #[test]
    fn test_permission_matrix() {
        let (roles, group) = setup();

        // (mode, owner, member, non-member, operator)
        let expected = [
            (PermissionMode::Never, false, false, false, false),
            (PermissionMode::Op, false, false, false, true),
            (PermissionMode::Owner, true, false, false, false),
            (PermissionMode::Member, true, true, false, false),
            (PermissionMode::Everyone, true, true, true, true),
        ];

        let check = |who: &PlayerSender, mode| {
            PermissionPolicy::evaluate(who, mode, NODE_SEND_ALL, &group)
        };
        for (mode, owner, member, outsider, operator) in expected {
            assert_eq!(check(&roles.owner, mode), owner, "{mode} owner");
            assert_eq!(check(&roles.member, mode), member, "{mode} member");
            assert_eq!(check(&roles.outsider, mode), outsider, "{mode} non-member");
            assert_eq!(check(&roles.operator, mode), operator, "{mode} operator");
        }
    }

    #[test]
    fn test_override_node_beats_never() {
        let (roles, group) = setup();
        let owner_with_node = roles.owner.clone().with_permission(NODE_MODIFY_ALL);

        for mode in MODES {
            assert!(PermissionPolicy::evaluate(
                &owner_with_node,
                mode,
                NODE_MODIFY_ALL,
                &group
            ));
        }
        assert!(!PermissionPolicy::evaluate(
            &owner_with_node,
            PermissionMode::Never,
            NODE_SEND_ALL,
            &group
        ));
    }

    #[test]
    fn test_actions_use_their_own_mode_and_node() {
        let (roles, mut group) = setup();
        group.dissolution_mode = PermissionMode::Never;

        assert!(PermissionPolicy::can(&roles.member, GroupAction::Send, &group));
        assert!(!PermissionPolicy::can(&roles.member, GroupAction::Modify, &group));
        assert!(PermissionPolicy::can(&roles.owner, GroupAction::Modify, &group));
        assert!(!PermissionPolicy::can(&roles.owner, GroupAction::Dissolve, &group));

        let admin = roles.outsider.clone().with_permission(NODE_DISSOLUTION_ALL);
        assert!(PermissionPolicy::can(&admin, GroupAction::Dissolve, &group));
        assert!(!PermissionPolicy::can(&admin, GroupAction::Modify, &group));
    }

    #[test]
    fn test_console_and_placeholder() {
        let (_roles, group) = setup();
        assert!(PermissionPolicy::can(&ConsoleSender, GroupAction::Dissolve, &group));
        assert!(!PermissionPolicy::can(
            &PlaceholderSender::new("ghost"),
            GroupAction::Send,
            &group
        ));
    }

    #[test]
    fn test_can_create() {
        let (roles, _group) = setup();
        assert!(PermissionPolicy::can_create(&roles.member, 4, 5));
        assert!(!PermissionPolicy::can_create(&roles.member, 5, 5));

        let unlimited = roles.member.clone().with_permission(NODE_CREATE_INFINITY);
        assert!(PermissionPolicy::can_create(&unlimited, 50, 5));
    }
}
