use crate::error::{ProvisioningError, ProvisioningResult};
use bon::Builder;
use std::collections::HashSet;

/// 单条版本化迁移脚本（脚本内容由各业务服务提供）
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Migration {
    version: i64,
    #[builder(into)]
    description: String,
    #[builder(into)]
    sql: String,
}

impl Migration {
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// 按版本升序排列的迁移集合
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// 校验版本号为正且唯一，并按版本排序
    pub fn new(mut migrations: Vec<Migration>) -> ProvisioningResult<Self> {
        let mut seen = HashSet::with_capacity(migrations.len());
        for m in &migrations {
            if m.version <= 0 {
                return Err(ProvisioningError::InvalidMigrations {
                    reason: format!("version must be positive: {}", m.version),
                });
            }
            if !seen.insert(m.version) {
                return Err(ProvisioningError::InvalidMigrations {
                    reason: format!("duplicate version: {}", m.version),
                });
            }
        }
        migrations.sort_by_key(|m| m.version);
        Ok(Self { migrations })
    }

    /// 最新可用版本；空集合返回 `None`
    pub fn latest_version(&self) -> Option<i64> {
        self.migrations.last().map(|m| m.version)
    }

    /// 版本号大于 `applied` 的迁移（按版本升序）
    pub fn pending_after(&self, applied: Option<i64>) -> &[Migration] {
        let start = match applied {
            Some(v) => self.migrations.partition_point(|m| m.version <= v),
            None => 0,
        };
        &self.migrations[start..]
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(version: i64) -> Migration {
        Migration::builder()
            .version(version)
            .description(format!("v{version}"))
            .sql(format!("CREATE TABLE t{version} (id BIGINT)"))
            .build()
    }

    #[test]
    fn sorts_and_reports_latest() {
        let set = MigrationSet::new(vec![m(3), m(1), m(2)]).unwrap();
        let versions: Vec<i64> = set.iter().map(Migration::version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(set.latest_version(), Some(3));
        assert_eq!(MigrationSet::default().latest_version(), None);
    }

    #[test]
    fn pending_after_skips_applied_versions() {
        let set = MigrationSet::new(vec![m(1), m(2), m(5)]).unwrap();
        assert_eq!(set.pending_after(None).len(), 3);
        assert_eq!(set.pending_after(Some(2))[0].version(), 5);
        assert_eq!(set.pending_after(Some(3))[0].version(), 5);
        assert!(set.pending_after(Some(5)).is_empty());
    }

    #[test]
    fn rejects_duplicate_and_non_positive_versions() {
        assert!(MigrationSet::new(vec![m(1), m(1)]).is_err());
        assert!(MigrationSet::new(vec![m(0)]).is_err());
    }
}
