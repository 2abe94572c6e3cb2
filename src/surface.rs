//! Surface readiness tracking for hosts that hand out the drawable surface
//! asynchronously.
//!
//! A surface becomes `Ready` once both a native window and a non-zero size
//! are known, in whatever order the host reports them. Windows handed back
//! in a [`SurfaceAction`] must only be dropped after the graphics state bound
//! to them has been torn down.

#[derive(Debug)]
pub enum SurfaceState<W> {
    Unbound,
    PendingWindow { window: Option<W>, width: u32, height: u32 },
    Ready { window: W, width: u32, height: u32 },
    Destroyed,
}

impl<W> SurfaceState<W> {
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceState::Unbound => "Unbound",
            SurfaceState::PendingWindow { .. } => "PendingWindow",
            SurfaceState::Ready { .. } => "Ready",
            SurfaceState::Destroyed => "Destroyed",
        }
    }
}

#[derive(Debug)]
pub enum SurfaceEvent<W> {
    Created,
    Changed { width: u32, height: u32 },
    WindowAcquired(W),
    Destroyed,
}

/// What the host has to do after an event.
#[derive(Debug, PartialEq, Eq)]
pub enum SurfaceAction<W> {
    None,
    /// Initialize against the ready window.
    Bind { width: u32, height: u32 },
    Resize { width: u32, height: u32 },
    /// Tear down, drop `released`, then initialize against the new window.
    Rebind { released: W, width: u32, height: u32 },
    /// Tear down, then drop `released`.
    Unbind { released: Option<W> },
}

#[derive(Debug)]
pub struct SurfaceLifecycle<W> {
    state: SurfaceState<W>,
}

impl<W> Default for SurfaceLifecycle<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> SurfaceLifecycle<W> {
    pub fn new() -> Self {
        Self {
            state: SurfaceState::Unbound,
        }
    }

    pub fn state(&self) -> &SurfaceState<W> {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SurfaceState::Ready { .. })
    }

    pub fn window(&self) -> Option<&W> {
        match &self.state {
            SurfaceState::Ready { window, .. } => Some(window),
            SurfaceState::PendingWindow { window, .. } => window.as_ref(),
            SurfaceState::Unbound | SurfaceState::Destroyed => None,
        }
    }

    pub fn handle(&mut self, event: SurfaceEvent<W>) -> SurfaceAction<W> {
        let state = std::mem::replace(&mut self.state, SurfaceState::Unbound);
        let from = state.name();
        let (next, action) = Self::transition(state, event);
        if from != next.name() {
            log::debug!("Surface {from} -> {}", next.name());
        }
        self.state = next;
        action
    }

    fn transition(state: SurfaceState<W>, event: SurfaceEvent<W>) -> (SurfaceState<W>, SurfaceAction<W>) {
        use SurfaceEvent as E;
        use SurfaceState as S;

        match (state, event) {
            (s @ (S::Unbound | S::Destroyed), E::Destroyed) => (s, SurfaceAction::None),
            // Hosts that never report creation explicitly start here.
            (S::Unbound | S::Destroyed, event) => Self::transition(
                S::PendingWindow {
                    window: None,
                    width: 0,
                    height: 0,
                },
                event,
            ),

            (s @ S::PendingWindow { .. }, E::Created) => (s, SurfaceAction::None),
            (S::PendingWindow { window, .. }, E::Changed { width, height }) => Self::settle(window, width, height),
            (S::PendingWindow { width, height, .. }, E::WindowAcquired(window)) => {
                Self::settle(Some(window), width, height)
            }
            (S::PendingWindow { window, .. }, E::Destroyed) => {
                (S::Destroyed, SurfaceAction::Unbind { released: window })
            }

            (s @ S::Ready { .. }, E::Created) => (s, SurfaceAction::None),
            (
                S::Ready {
                    window,
                    width: old_width,
                    height: old_height,
                },
                E::Changed { width, height },
            ) => {
                if width == 0 || height == 0 || (width, height) == (old_width, old_height) {
                    let ready = S::Ready {
                        window,
                        width: old_width,
                        height: old_height,
                    };
                    (ready, SurfaceAction::None)
                } else {
                    (S::Ready { window, width, height }, SurfaceAction::Resize { width, height })
                }
            }
            (
                S::Ready {
                    window: released,
                    width,
                    height,
                },
                E::WindowAcquired(window),
            ) => (
                S::Ready { window, width, height },
                SurfaceAction::Rebind { released, width, height },
            ),
            (S::Ready { window, .. }, E::Destroyed) => (
                S::Destroyed,
                SurfaceAction::Unbind {
                    released: Some(window),
                },
            ),
        }
    }

    fn settle(window: Option<W>, width: u32, height: u32) -> (SurfaceState<W>, SurfaceAction<W>) {
        match window {
            Some(window) if width > 0 && height > 0 => (
                SurfaceState::Ready { window, width, height },
                SurfaceAction::Bind { width, height },
            ),
            window => (SurfaceState::PendingWindow { window, width, height }, SurfaceAction::None),
        }
    }
}
