use serde::{Deserialize, Serialize};
use slpa_common::{MembershipMap, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Community view of a membership map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityResult {
    /// Node -> labels it belongs to
    pub node_to_communities: MembershipMap,
    /// Label -> member nodes (ascending), after the size filter
    pub community_to_nodes: BTreeMap<NodeId, Vec<NodeId>>,
    /// Nodes that belong to two or more communities
    pub overlapping_nodes: BTreeSet<NodeId>,
    pub num_communities: usize,
}

impl CommunityResult {
    /// Groups nodes by label and drops communities smaller than `min_community_size`.
    pub fn from_membership(membership: &MembershipMap, min_community_size: usize) -> Self {
        let mut groups: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for (&node, labels) in membership {
            for &label in labels {
                groups.entry(label).or_default().push(node);
            }
        }

        groups.retain(|_, members| members.len() >= min_community_size);

        let overlapping_nodes = membership
            .iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(&node, _)| node)
            .collect();

        let num_communities = groups.len();
        Self {
            node_to_communities: membership.clone(),
            community_to_nodes: groups,
            overlapping_nodes,
            num_communities,
        }
    }

    pub fn members(&self, label: NodeId) -> Option<&[NodeId]> {
        self.community_to_nodes.get(&label).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(entries: &[(NodeId, &[NodeId])]) -> MembershipMap {
        entries
            .iter()
            .map(|&(node, labels)| (node, labels.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_groups_overlapping_members() {
        let map = membership(&[(1, &[1]), (2, &[1]), (3, &[1, 4]), (4, &[4]), (5, &[4])]);
        let result = CommunityResult::from_membership(&map, 1);

        assert_eq!(result.num_communities, 2);
        assert_eq!(result.members(1), Some(&[1, 2, 3][..]));
        assert_eq!(result.members(4), Some(&[3, 4, 5][..]));
        assert_eq!(result.overlapping_nodes, BTreeSet::from([3]));
    }

    #[test]
    fn test_min_size_filter() {
        let map = membership(&[(1, &[1]), (2, &[1]), (3, &[3])]);
        let result = CommunityResult::from_membership(&map, 2);
        assert_eq!(result.num_communities, 1);
        assert!(result.members(3).is_none());
        // membership itself is not filtered
        assert_eq!(result.node_to_communities[&3], BTreeSet::from([3]));
    }

    #[test]
    fn test_serializes_to_json() {
        let map = membership(&[(1, &[2]), (2, &[2])]);
        let result = CommunityResult::from_membership(&map, 1);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["num_communities"], 1);
        assert_eq!(json["community_to_nodes"]["2"], serde_json::json!([1, 2]));
    }
}
