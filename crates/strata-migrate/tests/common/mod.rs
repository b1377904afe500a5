#![allow(dead_code)]

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use strata_migrate::prelude::*;

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

pub fn users_model() -> ModelDescriptor {
    ModelDescriptor::new("User")
        .field(FieldDescriptor::new("id", "AutoField"))
        .field(FieldDescriptor::new("username", "CharField").required().unique())
        .field(FieldDescriptor::new("email", "EmailField").required().unique())
}

/// posts -> accounts -> roles, plus posts <-> tags.
pub fn blog_registry() -> ModelRegistry {
    ModelRegistry::new()
        .register(
            ModelDescriptor::new("Post")
                .field(FieldDescriptor::new("id", "AutoField"))
                .field(FieldDescriptor::new("title", "CharField").required())
                .field(FieldDescriptor::new("body", "TextField"))
                .field(FieldDescriptor::new("published_at", "DateTimeField"))
                .field(
                    FieldDescriptor::new("account_id", "ForeignKey")
                        .required()
                        .references("accounts")
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .many_to_many("tags"),
        )
        .register(
            ModelDescriptor::new("Account")
                .field(FieldDescriptor::new("id", "AutoField"))
                .field(FieldDescriptor::new("email", "EmailField").required().unique())
                .field(FieldDescriptor::new("score", "FloatField"))
                .field(FieldDescriptor::new("active", "BooleanField").default_value("1"))
                .field(FieldDescriptor::new("role_id", "ForeignKey").references("roles")),
        )
        .register(
            ModelDescriptor::new("Role")
                .field(FieldDescriptor::new("id", "AutoField"))
                .field(FieldDescriptor::new("name", "CharField").required().unique())
                .field(FieldDescriptor::new("level", "PositiveIntegerField")),
        )
        .register(
            ModelDescriptor::new("Tag")
                .field(FieldDescriptor::new("id", "AutoField"))
                .field(FieldDescriptor::new("label", "SlugField").unique())
                .field(FieldDescriptor::new("icon", "BinaryField")),
        )
}

pub fn read_all(registry: &ModelRegistry) -> ModelSchemas {
    let models = registry.select(&[]).expect("all models are registered");
    ModelSchemas::read(&models, &PluralSnakeCase)
}

pub async fn execute_all(pool: &SqlitePool, statements: &[String]) {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute: {statement}\nError: {e}"));
    }
}

pub fn write_file(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).expect("Failed to write migration fixture");
}
