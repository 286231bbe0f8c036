//! SQL for customers, contacts and users.

use chrono::{DateTime, Utc};
use crmgate_core::{Contact, Customer, NewContact, NewCustomer, PageWindow};
use crmgate_storage::{CustomerFilter, StorageError, UserCredentials};
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use crate::error::{PG_FOREIGN_KEY_VIOLATION, PG_UNIQUE_VIOLATION, has_pg_error_code, query_error};

fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

/// `LIKE` pattern for a normalized search term; `None` matches everything.
fn like_pattern(filter: &CustomerFilter) -> Option<String> {
    filter.search.as_deref().map(|term| {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    })
}

fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn as_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub async fn insert_customer(
    pool: &PgPool,
    customer: NewCustomer,
) -> Result<Customer, StorageError> {
    let id: i64 = query_scalar(
        "INSERT INTO customers (name, email, phone) VALUES ($1, $2, $3) RETURNING id::BIGINT",
    )
    .bind(&customer.name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if has_pg_error_code(&e, PG_UNIQUE_VIOLATION) {
            StorageError::already_exists("customer", format!("email {}", customer.email))
        } else {
            query_error("Failed to create customer", e)
        }
    })?;

    Ok(customer.into_customer(id))
}

pub async fn select_customers(
    pool: &PgPool,
    filter: &CustomerFilter,
    window: PageWindow,
) -> Result<Vec<Customer>, StorageError> {
    let rows: Vec<(i64, String, String, Option<String>)> = query_as(
        r#"SELECT id::BIGINT, name, email, phone
           FROM customers
           WHERE $1::TEXT IS NULL OR LOWER(name) LIKE $1 OR LOWER(email) LIKE $1
           ORDER BY id DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(like_pattern(filter))
    .bind(as_i64(window.limit()))
    .bind(as_i64(window.offset()))
    .fetch_all(pool)
    .await
    .map_err(|e| query_error("Failed to list customers", e))?;

    Ok(rows
        .into_iter()
        .map(|(id, name, email, phone)| Customer {
            id,
            name,
            email,
            phone: phone.unwrap_or_default(),
        })
        .collect())
}

pub async fn count_customers(pool: &PgPool, filter: &CustomerFilter) -> Result<u64, StorageError> {
    let total: i64 = query_scalar(
        r#"SELECT COUNT(*)
           FROM customers
           WHERE $1::TEXT IS NULL OR LOWER(name) LIKE $1 OR LOWER(email) LIKE $1"#,
    )
    .bind(like_pattern(filter))
    .fetch_one(pool)
    .await
    .map_err(|e| query_error("Failed to count customers", e))?;

    Ok(as_count(total))
}

pub async fn insert_contact(pool: &PgPool, contact: NewContact) -> Result<Contact, StorageError> {
    let (id, created_at): (i64, DateTime<Utc>) = query_as(
        "INSERT INTO contacts (customer_id, content) VALUES ($1, $2) RETURNING id::BIGINT, created_at::TIMESTAMPTZ",
    )
    .bind(contact.customer_id)
    .bind(&contact.content)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if has_pg_error_code(&e, PG_FOREIGN_KEY_VIOLATION) {
            StorageError::not_found("customer", contact.customer_id.to_string())
        } else {
            query_error("Failed to create contact", e)
        }
    })?;

    Ok(contact.into_contact(id, chrono_to_time(created_at)))
}

pub async fn select_contacts(
    pool: &PgPool,
    customer_id: i64,
    window: PageWindow,
) -> Result<Vec<Contact>, StorageError> {
    let rows: Vec<(i64, i64, String, DateTime<Utc>)> = query_as(
        r#"SELECT id::BIGINT, customer_id::BIGINT, content, created_at::TIMESTAMPTZ
           FROM contacts
           WHERE customer_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(customer_id)
    .bind(as_i64(window.limit()))
    .bind(as_i64(window.offset()))
    .fetch_all(pool)
    .await
    .map_err(|e| query_error("Failed to list contacts", e))?;

    Ok(rows
        .into_iter()
        .map(|(id, customer_id, content, created_at)| Contact {
            id,
            customer_id,
            content,
            created_at: chrono_to_time(created_at),
        })
        .collect())
}

pub async fn count_contacts(pool: &PgPool, customer_id: i64) -> Result<u64, StorageError> {
    let total: i64 = query_scalar("SELECT COUNT(*) FROM contacts WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(pool)
        .await
        .map_err(|e| query_error("Failed to count contacts", e))?;

    Ok(as_count(total))
}

pub async fn select_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserCredentials>, StorageError> {
    let row: Option<(i64, String, String)> = query_as(
        "SELECT id::BIGINT, email, password_hash FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| query_error("Failed to look up user", e))?;

    Ok(row.map(|(id, email, password_hash)| UserCredentials {
        id,
        email,
        password_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(&CustomerFilter::default()), None);
        assert_eq!(
            like_pattern(&CustomerFilter::search("Ali")).as_deref(),
            Some("%ali%")
        );
        assert_eq!(
            like_pattern(&CustomerFilter::search("50%_off")).as_deref(),
            Some("%50\\%\\_off%")
        );
    }

    #[test]
    fn test_chrono_to_time_keeps_subseconds() {
        let dt = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        let t = chrono_to_time(dt);
        assert_eq!(t.unix_timestamp(), 1_700_000_000);
        assert_eq!(t.millisecond(), 123);
    }
}
