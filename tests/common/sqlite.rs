#![cfg(feature = "rusqlite")]

use std::rc::Rc;

use ::rusqlite::Connection as RusqliteConnection;
use quarry::prelude::*;

/// An in-memory database with `person` and `membership` tables.
pub fn setup_db() -> Rc<SqliteConnection> {
    let conn = RusqliteConnection::open_in_memory().expect("Failed to create in-memory database");
    create_tables(&conn);
    Rc::new(SqliteConnection::new(conn))
}

fn create_tables(conn: &RusqliteConnection) {
    conn.execute_batch(
        "create table person (
            id integer primary key autoincrement,
            name text not null,
            age integer
        );
        create table membership (
            group_id integer not null,
            user_id integer not null,
            role text,
            primary key (group_id, user_id)
        );
        create table invite (
            group_id integer not null,
            user_id integer not null
        );",
    )
    .expect("Failed to create tables");
}

/// Fills `membership` with every `(group, user)` pair of groups 1..=3 and
/// users 10..=12.
pub fn seed_memberships(conn: &SqliteConnection) {
    for group in 1..=3 {
        for user in 10..=12 {
            conn.conn()
                .execute(
                    "insert into membership (group_id, user_id, role) values (?1, ?2, 'member')",
                    [group, user],
                )
                .expect("Failed to seed membership");
        }
    }
}
