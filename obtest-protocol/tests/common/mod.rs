//! Helpers for driving the interpreter against scripted mock servers

#![allow(dead_code)]

use obtest_core::test_utils::{MockServer, Reply};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const SELECT_BASIC: &[&str] = &[
    "create table t(id int, name char(4));",
    "insert into t values(1,'a');",
    "insert into t values(2,'b');",
    "select * from t;",
];

/// Rows of table `t`, with uncommitted inserts visible only to their own connection.
#[derive(Default)]
struct TableState {
    committed: Vec<String>,
    pending: HashMap<usize, Vec<String>>,
    in_transaction: HashSet<usize>,
}

impl TableState {
    fn handle(&mut self, conn: usize, request: &str) -> Reply {
        let request = request.trim().to_lowercase();

        if request.starts_with("create table") {
            return Reply::text("SUCCESS");
        }
        if request == "begin;" {
            self.in_transaction.insert(conn);
            return Reply::text("SUCCESS");
        }
        if request == "commit;" {
            self.in_transaction.remove(&conn);
            if let Some(rows) = self.pending.remove(&conn) {
                self.committed.extend(rows);
            }
            return Reply::text("SUCCESS");
        }
        if let Some(values) = request
            .strip_prefix("insert into t values(")
            .and_then(|rest| rest.strip_suffix(");"))
        {
            let row = values.replace('\'', "").replace(',', "|");
            if self.in_transaction.contains(&conn) {
                self.pending.entry(conn).or_default().push(row);
            } else {
                self.committed.push(row);
            }
            return Reply::text("SUCCESS");
        }
        if request == "select * from t;" {
            let mut lines = vec!["id | name".to_owned()];
            lines.extend(self.committed.iter().cloned());
            if let Some(rows) = self.pending.get(&conn) {
                lines.extend(rows.iter().cloned());
            }
            return Reply::Text(lines.join("\n"));
        }
        Reply::text("FAILURE")
    }
}

/// A mock that keeps one table with per-connection transactions.
pub async fn table_server() -> MockServer {
    let state = Arc::new(Mutex::new(TableState::default()));
    MockServer::tcp(move |conn, request| {
        state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handle(conn, request)
    })
    .await
    .unwrap()
}
