pub use sea_orm_migration::prelude::*;

mod m20201201_000001_sites;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20201201_000001_sites::Migration)]
    }
}
