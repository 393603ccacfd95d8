use std::fmt;
use std::time::{Duration, Instant};

use crate::prelude::*;

/// Startup stages, in the only order they may complete in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootStage {
    LoggingReady,
    CredentialsLoaded,
    ServicesConstructed,
    RegistryPopulated,
    GatewayAuthenticated,
    GatewayConnected,
    MembersSynced,
    CommandsLoaded,
    Idle,
}

impl BootStage {
    pub const ALL: [BootStage; 9] = [
        BootStage::LoggingReady,
        BootStage::CredentialsLoaded,
        BootStage::ServicesConstructed,
        BootStage::RegistryPopulated,
        BootStage::GatewayAuthenticated,
        BootStage::GatewayConnected,
        BootStage::MembersSynced,
        BootStage::CommandsLoaded,
        BootStage::Idle,
    ];

    pub fn next(self) -> Option<BootStage> {
        let pos = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(pos + 1).copied()
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::LoggingReady => "logging",
            BootStage::CredentialsLoaded => "credentials",
            BootStage::ServicesConstructed => "services",
            BootStage::RegistryPopulated => "registry",
            BootStage::GatewayAuthenticated => "authenticate",
            BootStage::GatewayConnected => "connect",
            BootStage::MembersSynced => "member sync",
            BootStage::CommandsLoaded => "command load",
            BootStage::Idle => "idle",
        };
        write!(f, "{}", name)
    }
}

/// Tracks which stage the startup sequence reached and refuses to skip any.
/// A fresh tracker sits at [`BootStage::LoggingReady`].
pub struct StageTracker {
    current: BootStage,
    started: Instant,
    last: Instant,
    logger: Logger,
}

impl StageTracker {
    pub fn new(logger: Logger) -> Self {
        let now = Instant::now();
        Self {
            current: BootStage::LoggingReady,
            started: now,
            last: now,
            logger,
        }
    }

    pub fn current(&self) -> BootStage {
        self.current
    }

    /// The stage that has to complete next
    pub fn pending(&self) -> Option<BootStage> {
        self.current.next()
    }

    pub fn complete(&mut self, stage: BootStage) -> Result<(), BootError> {
        if self.current.next() != Some(stage) {
            return Err(BootError::OutOfOrder {
                current: self.current,
                found: stage,
            });
        }
        let now = Instant::now();
        debug!(self.logger, "Stage complete";
            "stage" => stage.to_string(),
            "took" => format!("{:?}", now - self.last),
        );
        self.current = stage;
        self.last = now;
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
