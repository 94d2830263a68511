use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    Name,
    Role,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// Stations (physical checkpoints)
#[derive(DeriveIden)]
enum Stations {
    Table,
    Id,
    Name,
    Description,
    QrIdentifier,
    Location,
    ImageUrl,
    Tips,
    SortOrder,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Classes {
    Table,
    Id,
    Name,
    ClassCode,
    TeacherId,
    Grade,
    StudentCount,
    IsActive,
    IsCompleted,
    CompletedAt,
    LastScanAt,
    RegisteredAt,
    StationsScanned,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Scans {
    Table,
    Id,
    ClassId,
    StationId,
    ScannedAt,
    DeviceInfo,
}

#[derive(DeriveIden)]
enum Drawings {
    Table,
    Id,
    Name,
    Description,
    DrawingDate,
    EligibleClassIds,
    Winners,
    WeightingFactors,
    Status,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Roles and drawing status are plain strings checked in the application layer,
/// so no Postgres enum types are created here.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string_len(255).not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string_len(255).not_null())
                    .col(ColumnDef::new(Users::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(32)
                            .not_null()
                            .default("teacher"),
                    )
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_email_unique")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Stations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Stations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Stations::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Stations::Description).text().null())
                    .col(
                        ColumnDef::new(Stations::QrIdentifier)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Stations::Location).string_len(255).null())
                    .col(ColumnDef::new(Stations::ImageUrl).string_len(1024).null())
                    .col(
                        ColumnDef::new(Stations::Tips)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Stations::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Stations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Stations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Stations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stations_qr_identifier_unique")
                    .table(Stations::Table)
                    .col(Stations::QrIdentifier)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Classes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Classes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Classes::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Classes::ClassCode).string_len(32).not_null())
                    .col(ColumnDef::new(Classes::TeacherId).big_integer().not_null())
                    .col(ColumnDef::new(Classes::Grade).string_len(64).null())
                    .col(ColumnDef::new(Classes::StudentCount).integer().null())
                    .col(
                        ColumnDef::new(Classes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Classes::IsCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Classes::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Classes::LastScanAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Classes::RegisteredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Classes::StationsScanned)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Classes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Classes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classes_teacher")
                            .from(Classes::Table, Classes::TeacherId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_classes_class_code_unique")
                    .table(Classes::Table)
                    .col(Classes::ClassCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_classes_teacher")
                    .table(Classes::Table)
                    .col(Classes::TeacherId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Scans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Scans::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Scans::ClassId).big_integer().not_null())
                    .col(ColumnDef::new(Scans::StationId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Scans::ScannedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(ColumnDef::new(Scans::DeviceInfo).json_binary().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scans_class")
                            .from(Scans::Table, Scans::ClassId)
                            .to(Classes::Table, Classes::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scans_station")
                            .from(Scans::Table, Scans::StationId)
                            .to(Stations::Table, Stations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 一个班级对同一站点最多一条扫描记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scans_class_station_unique")
                    .table(Scans::Table)
                    .col(Scans::ClassId)
                    .col(Scans::StationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Drawings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Drawings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Drawings::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Drawings::Description).text().null())
                    .col(
                        ColumnDef::new(Drawings::DrawingDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Drawings::EligibleClassIds)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Drawings::Winners)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Drawings::WeightingFactors)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Drawings::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Drawings::CreatedBy).big_integer().not_null())
                    .col(
                        ColumnDef::new(Drawings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Drawings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_drawings_created_by")
                            .from(Drawings::Table, Drawings::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：依赖表优先
        manager
            .drop_table(Table::drop().if_exists().table(Drawings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Scans::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Classes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Stations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}
