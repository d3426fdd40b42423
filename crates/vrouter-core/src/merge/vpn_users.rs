// Remote-access VPN users, keyed by user name.
//
// Entries already marked `add: false` are pruned before the payload is
// applied, so a removal survives exactly one render before disappearing.

use serde_json::Value;

use super::{decode, list_field, MergeError, MergeOutcome};
use crate::model::{DataBag, ResourceType, VpnUser};

const RESOURCE: ResourceType = ResourceType::VpnUsers;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    let Some(users) = list_field(RESOURCE, payload, "vpn_users")? else {
        return Ok(MergeOutcome::unchanged(current));
    };

    let mut bag = current.clone();
    bag.entries.retain(|_, stored| {
        serde_json::from_value::<VpnUser>(stored.clone()).map_or(true, |user| user.add)
    });

    for raw in users {
        let user: VpnUser = decode(RESOURCE, raw)?;
        bag.insert(user.user, raw.clone());
    }
    Ok(MergeOutcome::with(bag, Vec::new()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn removal_marker_is_kept_until_the_next_merge() {
        let bag = DataBag::new(RESOURCE);
        let bag = merge(
            &bag,
            &json!({"vpn_users": [{"user": "alice", "password": "pw", "add": true},
                                  {"user": "bob", "password": "pw", "add": true}]}),
        )
        .unwrap()
        .bag;

        let bag = merge(&bag, &json!({"vpn_users": [{"user": "bob", "add": false}]}))
            .unwrap()
            .bag;
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("bob").unwrap()["add"], false);

        let bag = merge(&bag, &json!({"vpn_users": []})).unwrap().bag;
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[test]
    fn user_without_name_is_rejected() {
        let bag = DataBag::new(RESOURCE);
        assert!(merge(&bag, &json!({"vpn_users": [{"password": "pw"}]})).is_err());
    }
}
