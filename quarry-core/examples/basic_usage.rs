use quarry_core::{delete, from, insert, merge, op, update, Dialect, Filterable, QueryBuilder};

fn main() -> quarry_core::Result<()> {
    let select_query = from("users AS u")
        .columns(["u.id", "u.name", "u.email"])
        .left_join("orders AS o", "o.user_id", "u.id")
        .where_(("u.age", op::GT, 18))
        .where_(("u.status", "active"))
        .where_like("u.city", "%York%")
        .order_by_desc("u.id")
        .limit(10)
        .offset(5);

    for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Sqlite] {
        let built = select_query.build_with(dialect)?;
        println!("{dialect} SELECT: {}", built.sql);
        println!("{dialect} params: {:?}", built.params);
    }

    let insert_query = insert("users")
        .values([("name", "John Doe"), ("email", "john@example.com")])
        .on_conflict("email")
        .merge_columns(["name"])
        .returning("id");
    println!("INSERT: {}", insert_query.to_sql()?);

    let update_query = update("users")
        .set([("email", "new@example.com")])
        .increment("login_count", 1)
        .where_(("id", 123))
        .and_where(("active", true));
    println!("UPDATE: {}", update_query.to_sql()?);

    let delete_query = delete("users")
        .where_(("age", op::LT, 13))
        .or_where(("last_login", op::LT, "2020-01-01"));
    println!("DELETE: {}", delete_query.to_sql()?);

    // no WHERE: refused at build time
    if let Err(e) = delete("users").to_sql() {
        println!("unconditional DELETE rejected: {e}");
    }

    let merge_query = merge("users AS u")
        .using("staging AS s")
        .on("u.id", "=", "s.id")
        .when_matched_update_columns([("name", "s.name")])
        .when_not_matched_insert_columns([("id", "s.id"), ("name", "s.name")]);
    println!("MERGE (Postgres): {}", merge_query.to_sql()?);
    println!(
        "MERGE (MySQL):    {}",
        merge_query.build_with(Dialect::Mysql)?.sql
    );

    println!(
        "inlined for logs: {}",
        from("users").where_(("name", "O'Brien")).to_string_inlined()?
    );
    Ok(())
}
