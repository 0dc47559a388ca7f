//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 저장소 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 스키마 생성 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 데이터 쓰기 오류 (트랜잭션 롤백됨)
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 데이터 삭제 오류
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// 저장된 값이 도메인 타입으로 변환되지 않음
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 파일 입출력 오류
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DataError::ConnectionError(err.to_string())
            }
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
