//! Authorization rules over the actor's trip role.

use tripchat_types::models::TripRole;

pub fn can_manage_group(role: TripRole, actor_is_creator: bool) -> bool {
    role.is_admin() || (actor_is_creator && role.is_member())
}

pub fn can_read_group(role: TripRole) -> bool {
    role.is_member()
}

pub fn can_post(role: TripRole) -> bool {
    role.is_member()
}

pub fn can_edit_others_message(role: TripRole) -> bool {
    role.is_admin()
}

pub fn can_create_group(role: TripRole) -> bool {
    role.is_admin()
}

pub fn can_update_group(role: TripRole) -> bool {
    role.is_admin()
}

/// Author of the message, or a trip owner/admin.
pub fn can_modify_message(role: TripRole, actor_is_author: bool) -> bool {
    can_edit_others_message(role) || (actor_is_author && role.is_member())
}

/// Managers may remove anyone; members may always leave.
pub fn can_remove_member(role: TripRole, actor_is_creator: bool, removing_self: bool) -> bool {
    can_manage_group(role, actor_is_creator) || (removing_self && role.is_member())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TripRole::{Admin, Member, None as NoRole, Owner};

    #[rstest]
    #[case(Owner, false, true)]
    #[case(Admin, false, true)]
    #[case(Member, false, false)]
    #[case(Member, true, true)]
    #[case(NoRole, true, false)]
    #[case(NoRole, false, false)]
    fn manage_group(#[case] role: TripRole, #[case] creator: bool, #[case] allowed: bool) {
        assert_eq!(can_manage_group(role, creator), allowed);
    }

    #[rstest]
    #[case(Owner, true)]
    #[case(Admin, true)]
    #[case(Member, true)]
    #[case(NoRole, false)]
    fn read_and_post(#[case] role: TripRole, #[case] allowed: bool) {
        assert_eq!(can_read_group(role), allowed);
        assert_eq!(can_post(role), allowed);
    }

    #[rstest]
    #[case(Owner, true)]
    #[case(Admin, true)]
    #[case(Member, false)]
    #[case(NoRole, false)]
    fn admin_only(#[case] role: TripRole, #[case] allowed: bool) {
        assert_eq!(can_create_group(role), allowed);
        assert_eq!(can_update_group(role), allowed);
        assert_eq!(can_edit_others_message(role), allowed);
    }

    #[rstest]
    #[case(Member, true, true)]
    #[case(Member, false, false)]
    #[case(Admin, false, true)]
    #[case(NoRole, true, false)]
    fn modify_message(#[case] role: TripRole, #[case] author: bool, #[case] allowed: bool) {
        assert_eq!(can_modify_message(role, author), allowed);
    }

    #[rstest]
    #[case(Member, false, true, true)]
    #[case(Member, false, false, false)]
    #[case(Member, true, false, true)]
    #[case(Owner, false, false, true)]
    #[case(NoRole, false, true, false)]
    fn remove_member(
        #[case] role: TripRole,
        #[case] creator: bool,
        #[case] this_is_me: bool,
        #[case] allowed: bool,
    ) {
        assert_eq!(can_remove_member(role, creator, this_is_me), allowed);
    }
}
