use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // History listing filters by owner and sorts by time
        manager
            .create_index(
                Index::create()
                    .name("idx_analyses_user_created_at")
                    .table(Analyses::Table)
                    .col(Analyses::UserId)
                    .col(Analyses::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_reset_token")
                    .table(Users::Table)
                    .col(Users::ResetToken)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_users_reset_token")
                    .table(Users::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_analyses_user_created_at")
                    .table(Analyses::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum Analyses {
    Table,
    UserId,
    CreatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    ResetToken,
}
