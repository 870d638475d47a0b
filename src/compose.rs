//! Turning a SRV answer into a concrete endpoint.

use crate::{
    policy::{FirstRecord, Policy},
    record::{ResolvedEndpoint, SrvAnswer},
};

/// Errors produced when an answer cannot be turned into an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// The answer held no SRV records at all
    #[error("SRV answer contained no records")]
    Empty,
    /// The additional section had no address for the chosen target, e.g. the
    /// DNS server did not glue the target's A record into the response
    #[error("no A/AAAA record in the additional section for SRV target {target}")]
    RecordNotFound {
        /// Target the address was missing for
        target: String,
    },
}

impl SrvAnswer {
    /// Resolves the first SRV record's target through the additional section.
    ///
    /// Records are not reordered by priority or weight; see [`compose_with`]
    /// for that.
    ///
    /// [`compose_with`]: SrvAnswer::compose_with
    pub fn compose(&self) -> Result<ResolvedEndpoint, ComposeError> {
        self.compose_with(&FirstRecord)
    }

    /// Resolves the target chosen by `policy` through the additional section.
    pub fn compose_with(&self, policy: &impl Policy) -> Result<ResolvedEndpoint, ComposeError> {
        let record = policy.select(&self.records).ok_or(ComposeError::Empty)?;
        let ip = self
            .glue_for(&record.target)
            .ok_or_else(|| ComposeError::RecordNotFound {
                target: record.target.clone(),
            })?;
        Ok(ResolvedEndpoint::new(ip, record.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{policy::PriorityWeight, GlueRecord, SrvTarget};
    use std::{
        net::{Ipv4Addr, Ipv6Addr},
        time::Instant,
    };

    fn answer(records: Vec<SrvTarget>, additional: Vec<GlueRecord>) -> SrvAnswer {
        SrvAnswer::new(records, additional, Instant::now())
    }

    #[test]
    fn glued_target() {
        let answer = answer(
            vec![SrvTarget::new(1, 1, 9000, "app1.service.consul.")],
            vec![GlueRecord::new(
                "app1.service.consul.",
                Ipv4Addr::new(10, 0, 0, 5),
            )],
        );
        assert_eq!(
            answer.compose(),
            Ok(ResolvedEndpoint::new(Ipv4Addr::new(10, 0, 0, 5), 9000))
        );
    }

    #[test]
    fn ipv6_glue() {
        let answer = answer(
            vec![SrvTarget::new(1, 1, 443, "app.service.consul.")],
            vec![GlueRecord::new("app.service.consul.", Ipv6Addr::LOCALHOST)],
        );
        assert_eq!(
            answer.compose(),
            Ok(ResolvedEndpoint::new(Ipv6Addr::LOCALHOST, 443))
        );
    }

    #[test]
    fn missing_glue() {
        let answer = answer(
            vec![SrvTarget::new(1, 1, 9000, "app1.service.consul.")],
            vec![GlueRecord::new(
                "app2.service.consul.",
                Ipv4Addr::new(10, 0, 0, 6),
            )],
        );
        assert_eq!(
            answer.compose(),
            Err(ComposeError::RecordNotFound {
                target: "app1.service.consul.".into()
            })
        );
    }

    #[test]
    fn no_records() {
        assert_eq!(answer(vec![], vec![]).compose(), Err(ComposeError::Empty));
    }

    #[test]
    fn first_record_wins_over_priority() {
        let answer = answer(
            vec![
                SrvTarget::new(50, 1, 9001, "slow.service.consul."),
                SrvTarget::new(1, 1, 9000, "fast.service.consul."),
            ],
            vec![
                GlueRecord::new("fast.service.consul.", Ipv4Addr::new(10, 0, 0, 1)),
                GlueRecord::new("slow.service.consul.", Ipv4Addr::new(10, 0, 0, 2)),
            ],
        );
        assert_eq!(
            answer.compose(),
            Ok(ResolvedEndpoint::new(Ipv4Addr::new(10, 0, 0, 2), 9001))
        );
        assert_eq!(
            answer.compose_with(&PriorityWeight),
            Ok(ResolvedEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 9000))
        );
    }

    #[test]
    fn glue_for_other_targets_does_not_help() {
        // Only the selected record's target is consulted.
        let answer = answer(
            vec![
                SrvTarget::new(1, 1, 9000, "unglued.service.consul."),
                SrvTarget::new(1, 1, 9001, "glued.service.consul."),
            ],
            vec![GlueRecord::new(
                "glued.service.consul.",
                Ipv4Addr::new(10, 0, 0, 7),
            )],
        );
        assert!(matches!(
            answer.compose(),
            Err(ComposeError::RecordNotFound { .. })
        ));
    }
}
