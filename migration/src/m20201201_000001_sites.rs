use sea_orm_migration::prelude::*;

/// Development schema for the two tables the dashboard reads.
///
/// Production data is owned by the ingest side; this only exists so a fresh
/// local database has the shape the queries expect.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== SITES ==========
        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sites::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sites::Name).text().not_null())
                    .to_owned(),
            )
            .await?;

        // ========== SITE DATA ==========
        manager
            .create_table(
                Table::create()
                    .table(SiteData::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SiteData::SiteId).integer().not_null())
                    .col(ColumnDef::new(SiteData::Time).integer().not_null())
                    .col(ColumnDef::new(SiteData::Reading).decimal())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_site_data_site")
                            .from(SiteData::Table, SiteData::SiteId)
                            .to(Sites::Table, Sites::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Matches the dashboard's filter: site_id IN (...) AND time range
        manager
            .create_index(
                Index::create()
                    .name("idx_site_data_site_time")
                    .table(SiteData::Table)
                    .col(SiteData::SiteId)
                    .col(SiteData::Time)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SiteData::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sites::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum SiteData {
    Table,
    SiteId,
    Time,
    Reading,
}
