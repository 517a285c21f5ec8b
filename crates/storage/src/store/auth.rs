#![forbid(unsafe_code)]

use super::listeners::{EventSink, Listeners, StoreEvent, Subscription, send};
use boost_core::UserId;
use std::cell::RefCell;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(UserId),
}

impl AuthState {
    pub fn user(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

pub trait AuthProvider {
    fn state(&self) -> AuthState;

    /// Future state changes are delivered as `StoreEvent::Auth`.
    fn subscribe(&self, sink: EventSink) -> Subscription;
}

/// Auth state driven directly by the embedding application.
#[derive(Default)]
pub struct LocalAuth {
    state: RefCell<Option<UserId>>,
    listeners: Listeners<()>,
}

impl LocalAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserId) -> Self {
        Self {
            state: RefCell::new(Some(user)),
            listeners: Listeners::default(),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        if self.state.borrow().as_ref() == Some(&user) {
            return;
        }
        tracing::info!(user_id = %user, "signed in");
        *self.state.borrow_mut() = Some(user);
        self.notify();
    }

    pub fn sign_out(&self) {
        if self.state.borrow_mut().take().is_some() {
            tracing::info!("signed out");
            self.notify();
        }
    }

    fn notify(&self) {
        let state = self.state();
        for (_, (), sink) in self.listeners.matching(|_| true) {
            send(&sink, StoreEvent::Auth(state.clone()));
        }
    }
}

impl AuthProvider for LocalAuth {
    fn state(&self) -> AuthState {
        match self.state.borrow().as_ref() {
            Some(user) => AuthState::Authenticated(user.clone()),
            None => AuthState::Anonymous,
        }
    }

    fn subscribe(&self, sink: EventSink) -> Subscription {
        self.listeners.add((), sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn sign_in_and_out_notify_only_live_listeners() {
        let auth = LocalAuth::new();
        let (tx, rx) = channel();
        let sub = auth.subscribe(tx.clone());
        let user = UserId::try_new("u1").unwrap();

        auth.sign_in(user.clone());
        auth.sign_in(user.clone());
        match rx.try_recv().expect("auth event") {
            StoreEvent::Auth(state) => assert_eq!(state, AuthState::Authenticated(user)),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "repeated sign-in must not notify");

        drop(sub);
        auth.sign_out();
        assert!(rx.try_recv().is_err());
        assert_eq!(auth.state(), AuthState::Anonymous);
    }
}
