mod helpers;

use db_reset::reset::{
    CascadingDeletePlanner, DeletePlan, ResetError, SchemaGraphReader, SelectiveReset, StepAction,
};
use helpers::{count, test_db, violations};
use rusqlite::types::Value;
use rusqlite::Connection;

fn plan_for(conn: &Connection, root: &str) -> (db_reset::db::catalog::Catalog, DeletePlan) {
    let reader = SchemaGraphReader::new(conn, "main");
    let catalog = reader.catalog().unwrap();
    let fks = reader.list_with(&catalog).unwrap();
    let plan = CascadingDeletePlanner::new(&fks, &catalog)
        .plan(root, None)
        .unwrap();
    plan.check_order(&fks).unwrap();
    (catalog, plan)
}

fn delete_position(plan: &DeletePlan, table: &str) -> usize {
    plan.delete_steps()
        .position(|s| s.table.name == table)
        .unwrap_or_else(|| panic!("{table} not in plan"))
}

#[test]
fn plan_deletes_children_before_parents() {
    let conn = test_db();
    let (_, plan) = plan_for(&conn, "appeal");

    let order: Vec<&str> = plan.delete_steps().map(|s| s.table.name.as_str()).collect();
    assert_eq!(
        order,
        [
            "audit_trail",
            "reason_selection_text",
            "reason_selection",
            "appellant_case",
            "document_version",
            "document",
            "folder",
            "appeal",
        ]
    );
    assert!(delete_position(&plan, "reason_selection") < delete_position(&plan, "appellant_case"));

    let nulled: Vec<(&str, Vec<String>)> = plan
        .nullify_steps()
        .map(|s| match &s.action {
            StepAction::Nullify { columns, .. } => (s.table.name.as_str(), columns.clone()),
            StepAction::Delete => unreachable!(),
        })
        .collect();
    assert_eq!(
        nulled,
        [
            ("appeal", vec!["parent_appeal_id".to_string()]),
            ("document", vec!["latest_version".to_string()]),
        ]
    );
}

#[test]
fn removes_the_tree_and_leaves_the_rest() {
    let mut conn = test_db();
    let (catalog, plan) = plan_for(&conn, "appeal");

    let report = SelectiveReset::new(&catalog, &plan, 2)
        .execute(&mut conn, &[Value::Integer(1)])
        .unwrap();

    // Appeal 1 and its linked appeal 2 go; appeal 3 stays
    let remaining: Vec<i64> = conn
        .prepare("SELECT id FROM appeal ORDER BY id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(remaining, [3]);
    assert_eq!(report.resolved["appeal"], 2);

    assert_eq!(count(&conn, "appellant_case"), 1);
    assert_eq!(count(&conn, "reason_selection"), 1);
    assert_eq!(count(&conn, "reason_selection_text"), 1);
    assert_eq!(count(&conn, "folder"), 1);
    assert_eq!(count(&conn, "document"), 1);
    assert_eq!(count(&conn, "document_version"), 1);
    assert_eq!(count(&conn, "audit_trail"), 1);

    // Parents outside the tree are untouched
    assert_eq!(count(&conn, "lpa"), 1);
    assert_eq!(count(&conn, "incomplete_reason"), 2);
    assert_eq!(count(&conn, "\"user\""), 2);

    // SET NULL children are left to the store
    let site: Option<i64> = conn
        .query_row("SELECT appeal_id FROM neighbouring_site WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(site, None);

    // The other tree keeps its cycle intact
    let latest: Option<i64> = conn
        .query_row("SELECT latest_version FROM document WHERE guid = 'doc-c'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(latest, Some(1));

    assert_eq!(violations(&conn), 0);
    assert_eq!(report.deleted(), 2 + 2 + 2 + 1 + 1 + 1 + 2 + 1);
}

#[test]
fn reason_selections_are_deleted_before_their_case() {
    let mut conn = test_db();
    let (catalog, plan) = plan_for(&conn, "appeal");

    let report = SelectiveReset::new(&catalog, &plan, 500)
        .execute(&mut conn, &[Value::Integer(1)])
        .unwrap();

    let position = |table: &str, action: &str| {
        report
            .steps
            .iter()
            .position(|s| s.table == table && s.action == action)
            .unwrap()
    };
    assert!(position("reason_selection", "delete") < position("appellant_case", "delete"));
    assert!(position("appeal", "nullify") < position("reason_selection", "delete"));
}

#[test]
fn reversed_order_fails_at_the_store_and_rolls_back_deletes() {
    let mut conn = test_db();
    let (catalog, plan) = plan_for(&conn, "appeal");
    let fks = SchemaGraphReader::new(&conn, "main").list_foreign_keys().unwrap();

    let mut deletes: Vec<_> = plan.delete_steps().cloned().collect();
    deletes.reverse();
    let mut steps: Vec<_> = plan.nullify_steps().cloned().collect();
    steps.extend(deletes);
    let reversed = DeletePlan::from_steps(plan.root().clone(), plan.root_column(), steps, &fks);
    assert!(matches!(
        reversed.check_order(&fks),
        Err(ResetError::PlanOrder { .. })
    ));

    let err = SelectiveReset::new(&catalog, &reversed, 500)
        .execute(&mut conn, &[Value::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, ResetError::BatchDelete { .. }), "{err}");
    assert!(err.to_string().contains("FOREIGN KEY constraint failed"), "{err}");

    // Every delete was rolled back
    assert_eq!(count(&conn, "appeal"), 3);
    assert_eq!(count(&conn, "audit_trail"), 2);
    assert_eq!(count(&conn, "reason_selection"), 3);
    assert_eq!(count(&conn, "temp.sqlite_master"), 0);
}

#[test]
fn text_root_ids_bind_by_value() {
    let mut conn = test_db();
    let reader = SchemaGraphReader::new(&conn, "main");
    let catalog = reader.catalog().unwrap();
    let fks = reader.list_with(&catalog).unwrap();
    let plan = CascadingDeletePlanner::new(&fks, &catalog)
        .plan("appeal", Some("reference"))
        .unwrap();

    SelectiveReset::new(&catalog, &plan, 500)
        .execute(
            &mut conn,
            &[Value::Text("APP/Q9999/W/24/0000003".into())],
        )
        .unwrap();
    assert_eq!(count(&conn, "appeal"), 2);
    assert_eq!(count(&conn, "document"), 1);
}
