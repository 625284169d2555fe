//! Query scoping filter: narrows data access to the domains a caller may act on.

use sqlx::{Postgres, QueryBuilder};

use super::domain_access::DomainContext;
use crate::models::DomainId;

/// The set of domains a query may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainScope {
    /// Global administrators: no filter.
    Unrestricted,
    /// Tenant-scoped caller with at least one membership. Never empty.
    Domains(Vec<DomainId>),
    /// Tenant-scoped caller with no memberships: matches nothing.
    Nothing,
}

impl DomainScope {
    pub fn from_context(ctx: &DomainContext) -> Self {
        if ctx.is_global_admin {
            return DomainScope::Unrestricted;
        }
        Self::from_ids(ctx.user_domains.iter().map(|du| du.domain_id).collect())
    }

    pub fn from_ids(mut ids: Vec<DomainId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            DomainScope::Nothing
        } else {
            DomainScope::Domains(ids)
        }
    }

    pub fn permits(&self, id: DomainId) -> bool {
        match self {
            DomainScope::Unrestricted => true,
            DomainScope::Domains(ids) => ids.binary_search(&id).is_ok(),
            DomainScope::Nothing => false,
        }
    }

    /// Append the scope predicate on `column` to a query that is positioned where
    /// a boolean expression is expected (after `WHERE` or `AND`).
    pub fn push_predicate(&self, qb: &mut QueryBuilder<'_, Postgres>, column: &str) {
        match self {
            DomainScope::Unrestricted => {
                qb.push("TRUE");
            }
            DomainScope::Domains(ids) => {
                qb.push(column).push(" IN (");
                let mut separated = qb.separated(", ");
                for id in ids {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");
            }
            DomainScope::Nothing => {
                qb.push("FALSE");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DomainRole, DomainUser};

    fn membership(domain_id: DomainId) -> DomainUser {
        DomainUser {
            id: domain_id * 10,
            user_id: 1,
            domain_id,
            role: DomainRole::DomainUser,
        }
    }

    fn sql_for(scope: &DomainScope) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM domains WHERE ");
        scope.push_predicate(&mut qb, "id");
        qb.sql().to_string()
    }

    #[test]
    fn test_global_admin_is_unrestricted() {
        let ctx = DomainContext {
            is_global_admin: true,
            user_domains: vec![],
            requested_domain_id: None,
        };
        let scope = DomainScope::from_context(&ctx);
        assert_eq!(scope, DomainScope::Unrestricted);
        assert!(scope.permits(42));
        assert_eq!(sql_for(&scope), "SELECT id FROM domains WHERE TRUE");
    }

    #[test]
    fn test_members_are_limited_to_their_domains() {
        let ctx = DomainContext {
            is_global_admin: false,
            user_domains: vec![membership(3), membership(1), membership(3)],
            requested_domain_id: None,
        };
        let scope = DomainScope::from_context(&ctx);
        assert_eq!(scope, DomainScope::Domains(vec![1, 3]));
        assert!(scope.permits(1));
        assert!(!scope.permits(2));
        assert_eq!(sql_for(&scope), "SELECT id FROM domains WHERE id IN ($1, $2)");
    }

    #[test]
    fn test_zero_memberships_match_nothing() {
        let ctx = DomainContext {
            is_global_admin: false,
            user_domains: vec![],
            requested_domain_id: None,
        };
        let scope = DomainScope::from_context(&ctx);
        assert_eq!(scope, DomainScope::Nothing);
        assert!(!scope.permits(1));
        assert_eq!(sql_for(&scope), "SELECT id FROM domains WHERE FALSE");
    }
}
