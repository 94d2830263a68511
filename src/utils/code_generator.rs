use crate::entities::{class_entity as classes, station_entity as stations};
use crate::error::AppResult;
use rand::Rng;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

// 去掉易混淆字符 0/O、1/I
const CLASS_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CLASS_CODE_LEN: usize = 6;

/// 生成6位班级代码
pub fn generate_class_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CLASS_CODE_LEN)
        .map(|_| CLASS_CODE_CHARS[rng.gen_range(0..CLASS_CODE_CHARS.len())] as char)
        .collect()
}

/// 生成唯一的班级代码
pub async fn generate_unique_class_code(pool: &DatabaseConnection) -> AppResult<String> {
    loop {
        let code = generate_class_code();
        let exists = classes::Entity::find()
            .filter(classes::Column::ClassCode.eq(code.as_str()))
            .count(pool)
            .await?;
        if exists == 0 {
            return Ok(code);
        }
    }
}

/// 生成唯一的站点二维码标识
pub async fn generate_unique_qr_identifier(pool: &DatabaseConnection) -> AppResult<String> {
    loop {
        let identifier = format!("station-{}", uuid::Uuid::new_v4().simple());
        let exists = stations::Entity::find()
            .filter(stations::Column::QrIdentifier.eq(identifier.as_str()))
            .count(pool)
            .await?;
        if exists == 0 {
            return Ok(identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_class_code() {
        let code = generate_class_code();
        assert_eq!(code.len(), CLASS_CODE_LEN);
        assert!(code.bytes().all(|b| CLASS_CODE_CHARS.contains(&b)));
        assert!(!code.contains('O') && !code.contains('0'));
    }
}
