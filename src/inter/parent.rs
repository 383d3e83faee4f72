/*!
The parent's dashboard: the children registered to the logged-in parent's
email, with the selected child's daily logs paged underneath.

A parent can only ever select among their own children. A `childId` in the
query string that doesn't belong to them is ignored in favor of their
first child, rather than leaking another family's logs.
*/
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    config::Glob,
    session::Session,
    store::Child,
};
use super::*;

fn select_child(children: &[Child], requested: Option<&str>) -> Option<i64> {
    let first = children.first().map(|c| c.id);
    let requested: i64 = match requested.and_then(|s| s.parse().ok()) {
        Some(n) => n,
        None => { return first; },
    };
    if children.iter().any(|c| c.id == requested) {
        Some(requested)
    } else {
        first
    }
}

/// Render the parent dashboard for an established parent session. Called
/// from the members-only dispatch.
pub async fn dashboard(
    session: &Session,
    glob: &Arc<RwLock<Glob>>,
    params: &PageParams,
) -> Response {
    log::trace!(
        "parent::dashboard( {:?}, {:?} ) called.", &session.email, params
    );

    let glob = glob.read().await;
    let children = match glob.store.children_of_parent(&session.email).await {
        Ok(c) => c,
        Err(e) => {
            log::error!(
                "Error fetching children of {:?}: {}", &session.email, &e
            );
            return html_500();
        },
    };

    let selected = select_child(&children, params.child_id.as_deref());
    let selected = match selected {
        Some(id) => id,
        None => {
            // No children registered to this address yet.
            let data = json!({
                "parent_name": &session.username,
                "parent_email": &session.email,
                "children": &children,
                "logs": [],
                "selected_child_id": null,
                "current_page": 1,
                "total_pages": 1,
            });
            return serve_template(StatusCode::OK, "parent_dashboard", &data, vec![]);
        },
    };

    let logs = match glob.store.logs_for_child_page(selected, params.page()).await {
        Ok(pg) => pg,
        Err(e) => {
            log::error!("Error fetching logs for child {}: {}", selected, &e);
            return html_500();
        },
    };

    let data = json!({
        "parent_name": &session.username,
        "parent_email": &session.email,
        "children": &children,
        "logs": &logs.items,
        "selected_child_id": selected,
        "current_page": logs.current_page,
        "total_pages": logs.total_pages,
    });
    serve_template(StatusCode::OK, "parent_dashboard", &data, vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    use time::macros::datetime;

    fn kid(id: i64, name: &str) -> Child {
        Child {
            id,
            first_name: name.to_owned(),
            last_name: "Ngata".to_owned(),
            gender: None,
            dob: None,
            picture: None,
            food_allergy: None,
            parent_first_name: None,
            parent_last_name: None,
            parent_email: Some("ngata@example.com".to_owned()),
            parent_phone: None,
            registered: datetime!(2025-01-15 09:00 UTC),
            status: "Enrolled".to_owned(),
        }
    }

    #[test]
    fn child_selection_stays_in_the_family() {
        let kids = vec![kid(4, "Mia"), kid(9, "Tane")];

        // Default and explicit selections.
        assert_eq!(select_child(&kids, None), Some(4));
        assert_eq!(select_child(&kids, Some("9")), Some(9));

        // Someone else's child id falls back to the first own child.
        assert_eq!(select_child(&kids, Some("77")), Some(4));
        assert_eq!(select_child(&kids, Some("banana")), Some(4));

        assert_eq!(select_child(&[], Some("4")), None);
        assert_eq!(select_child(&[], None), None);
    }
}
