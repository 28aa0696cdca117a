//! Navigation menu tree derived from permission records.

use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::permissions::PermissionDBResponse;
use crate::types::PermissionId;

/// One node of the navigation menu.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MenuNode {
    pub id: PermissionId,
    pub name: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    #[schema(no_recursion)]
    pub children: Vec<MenuNode>,
}

/// Group permission records into a tree by their parent attribute.
///
/// Callers pass the records that should appear in the menu (the resolver
/// excludes `BUTTON` records before calling). A record whose parent is not
/// part of the input becomes a root. Siblings are ordered by `sort_order`,
/// then id.
pub fn build_menu_tree(permissions: &[PermissionDBResponse]) -> Vec<MenuNode> {
    let known: std::collections::HashSet<PermissionId> = permissions.iter().map(|p| p.id).collect();

    let mut sorted: Vec<&PermissionDBResponse> = permissions.iter().collect();
    sorted.sort_by_key(|p| (p.sort_order, p.id));

    let roots: Vec<&PermissionDBResponse> = sorted
        .iter()
        .copied()
        .filter(|p| p.parent_id.is_none_or(|parent| !known.contains(&parent)))
        .collect();

    roots.into_iter().map(|root| build_node(root, &sorted)).collect()
}

fn build_node(record: &PermissionDBResponse, sorted: &[&PermissionDBResponse]) -> MenuNode {
    let children = sorted
        .iter()
        .copied()
        .filter(|p| p.parent_id == Some(record.id))
        .map(|child| build_node(child, sorted))
        .collect();

    MenuNode {
        id: record.id,
        name: record.name.clone(),
        path: record.path.clone(),
        icon: record.icon.clone(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::permissions::PermissionKind;

    fn permission(id: PermissionId, parent_id: Option<PermissionId>, sort_order: i32) -> PermissionDBResponse {
        PermissionDBResponse {
            id,
            code: format!("perm:{id}"),
            name: format!("Permission {id}"),
            kind: PermissionKind::Menu,
            parent_id,
            path: Some(format!("/p/{id}")),
            icon: None,
            sort_order,
        }
    }

    #[test]
    fn test_nesting_and_sibling_order() {
        let permissions = vec![
            permission(1, None, 2),
            permission(2, None, 1),
            permission(3, Some(1), 2),
            permission(4, Some(1), 1),
        ];

        let tree = build_menu_tree(&permissions);

        assert_eq!(tree.len(), 2);
        // Siblings ordered by sort_order
        assert_eq!(tree[0].id, 2);
        assert_eq!(tree[1].id, 1);
        assert_eq!(tree[1].children.iter().map(|n| n.id).collect::<Vec<_>>(), vec![4, 3]);
    }

    #[test]
    fn test_orphan_becomes_root() {
        // Parent 9 is not part of the input (e.g. filtered out)
        let permissions = vec![permission(1, Some(9), 0)];

        let tree = build_menu_tree(&permissions);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 1);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(build_menu_tree(&[]).is_empty());
    }
}
