// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, FormKind, Route};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub route: Route,
    pub signed_in: bool,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            route: Route::Login,
            signed_in: false,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Navigate(Route),
    NextRoute,
    PrevRoute,
    EnterEditMode,
    EnterSearch,
    ExitToNav,
    OpenForm(FormKind),
    SignedIn,
    SessionExpired,
    Logout,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    RouteChanged(Route),
    ModeChanged(AppMode),
    SessionChanged(bool),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::Navigate(route) => self.navigate(route),
            AppCommand::NextRoute => self.rotate_route(1),
            AppCommand::PrevRoute => self.rotate_route(-1),
            AppCommand::EnterEditMode => {
                if !self.route.has_table() {
                    return vec![self.set_status("nothing to edit here")];
                }
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::EnterSearch => {
                if !self.route.supports_search() {
                    return vec![self.set_status("search is not available here")];
                }
                self.mode = AppMode::Search;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode), self.set_status("nav")]
            }
            AppCommand::OpenForm(kind) => {
                self.mode = AppMode::Form(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::SignedIn => {
                self.signed_in = true;
                let mut events = vec![AppEvent::SessionChanged(true)];
                events.extend(self.navigate(Route::Home));
                events.push(self.set_status("signed in"));
                events
            }
            AppCommand::SessionExpired => self.sign_out("session expired -- sign in again"),
            AppCommand::Logout => self.sign_out("signed out"),
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    /// Protected routes redirect to the login screen while signed out.
    fn navigate(&mut self, route: Route) -> Vec<AppEvent> {
        let target = if route.requires_session() && !self.signed_in {
            Route::Login
        } else {
            route
        };
        let mut events = Vec::new();
        if self.mode != AppMode::Nav {
            self.mode = AppMode::Nav;
            events.push(AppEvent::ModeChanged(self.mode));
        }
        if target != self.route {
            self.route = target;
            events.push(AppEvent::RouteChanged(target));
        }
        events
    }

    fn rotate_route(&mut self, delta: isize) -> Vec<AppEvent> {
        if !self.signed_in {
            return Vec::new();
        }
        let tabs = Route::TABS;
        let current = tabs
            .iter()
            .position(|route| *route == self.route)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.navigate(tabs[next])
    }

    fn sign_out(&mut self, message: &str) -> Vec<AppEvent> {
        self.signed_in = false;
        let mut events = vec![AppEvent::SessionChanged(false)];
        events.extend(self.navigate(Route::Login));
        events.push(self.set_status(message));
        events
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState};
    use crate::{AppMode, FormKind, Route};

    fn signed_in() -> AppState {
        AppState {
            route: Route::Home,
            signed_in: true,
            ..AppState::default()
        }
    }

    #[test]
    fn protected_routes_redirect_to_login() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::Navigate(Route::Sellers));
        assert_eq!(state.route, Route::Login);
        assert!(events.is_empty());
    }

    #[test]
    fn route_rotation_wraps() {
        let mut state = AppState {
            route: Route::Reports,
            ..signed_in()
        };
        let events = state.dispatch(AppCommand::NextRoute);
        assert_eq!(state.route, Route::Home);
        assert_eq!(events, vec![AppEvent::RouteChanged(Route::Home)]);

        state.dispatch(AppCommand::PrevRoute);
        assert_eq!(state.route, Route::Reports);
    }

    #[test]
    fn sign_in_lands_on_home() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::SignedIn);
        assert_eq!(
            events,
            vec![
                AppEvent::SessionChanged(true),
                AppEvent::RouteChanged(Route::Home),
                AppEvent::StatusUpdated("signed in".to_owned()),
            ]
        );
    }

    #[test]
    fn expired_session_returns_to_login_from_any_mode() {
        let mut state = AppState {
            route: Route::Devolutions,
            mode: AppMode::Edit,
            ..signed_in()
        };
        let events = state.dispatch(AppCommand::SessionExpired);
        assert!(!state.signed_in);
        assert_eq!(state.route, Route::Login);
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(
            events.last(),
            Some(&AppEvent::StatusUpdated(
                "session expired -- sign in again".to_owned()
            ))
        );
    }

    #[test]
    fn search_only_where_supported() {
        let mut state = AppState {
            route: Route::Cash,
            ..signed_in()
        };
        state.dispatch(AppCommand::EnterSearch);
        assert_eq!(state.mode, AppMode::Nav);

        state.dispatch(AppCommand::Navigate(Route::Sellers));
        state.dispatch(AppCommand::EnterSearch);
        assert_eq!(state.mode, AppMode::Search);
    }

    #[test]
    fn mode_transitions() {
        let mut state = AppState {
            route: Route::Sellers,
            ..signed_in()
        };
        state.dispatch(AppCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Edit);

        state.dispatch(AppCommand::OpenForm(FormKind::Seller));
        assert_eq!(state.mode, AppMode::Form(FormKind::Seller));

        state.dispatch(AppCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
    }
}
