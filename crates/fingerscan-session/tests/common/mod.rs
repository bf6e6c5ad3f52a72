//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use fingerscan_core::SessionConfig;
use fingerscan_hardware::GatewayEventSink;
use fingerscan_hardware::mock::{MockDevice, MockGateway, MockGatewayHandle};
use fingerscan_session::{AppState, Directive, Session, SessionEffect, SessionEvent, UserCommand};

/// A session wired to a mock gateway, with callbacks looped back by hand.
pub struct Harness {
    pub session: Session<MockGateway>,
    pub mock: MockGatewayHandle,
    pub effects: mpsc::UnboundedReceiver<SessionEffect>,
    callbacks: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        let (gateway, mock) = MockGateway::new();
        let (tx, callbacks) = mpsc::unbounded_channel::<SessionEvent>();
        mock.connect(GatewayEventSink::from_sender(tx));
        let (session, effects) = Session::new(Arc::new(gateway), config);
        Self {
            session,
            mock,
            effects,
            callbacks,
        }
    }

    pub fn with_device(device: MockDevice) -> Self {
        let harness = Self::new(SessionConfig::default());
        harness.mock.attach_silently(device);
        harness
    }

    /// Handle one event, then every callback it caused.
    pub fn send(&mut self, event: impl Into<SessionEvent>) -> Vec<Directive> {
        let mut directives = self.session.handle(event.into());
        directives.extend(self.pump());
        directives
    }

    /// Handle queued callbacks until none are left.
    pub fn pump(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        while let Ok(event) = self.callbacks.try_recv() {
            directives.extend(self.session.handle(event));
        }
        directives
    }

    pub fn state(&self) -> AppState {
        self.session.state()
    }

    pub fn open(&mut self) {
        self.send(UserCommand::Refresh);
        self.send(UserCommand::Open);
        assert_eq!(self.state(), AppState::Initialized);
    }

    pub fn drain_effects(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        while let Ok(effect) = self.effects.try_recv() {
            effects.push(effect);
        }
        effects
    }
}

/// Every state entered, in order, according to the published effects.
pub fn entered_states(effects: &[SessionEffect]) -> Vec<AppState> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

pub fn notices(effects: &[SessionEffect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Notice(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
