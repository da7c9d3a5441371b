//! The swappable launcher slot.
//!
//! A build tool looks up its launcher once and then keeps calling that same
//! reference. To redirect those calls later without touching the build tool,
//! the slot is made to hold an [`Injector`]: a launcher that forwards every
//! call to whichever implementation is currently active inside it.
//!
//! The process-wide slot is a single mutex-guarded global. It is not
//! reentrant across threads: two threads opening capture scopes at the same
//! time will race on which launcher is active. Code that needs isolation
//! should create its own [`Injector`] and pass it to the build explicitly.

use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use super::error::BuildError;
use super::launcher::{DirectSpawn, Spawn, SpawnOptions};

/// Indirection cell in front of a launcher.
///
/// Remembers the launcher it was created around so that [`Injector::reset`]
/// can always get back to it, however many times [`Injector::set`] ran.
pub struct Injector {
    original: Arc<dyn Spawn>,
    active: RwLock<Arc<dyn Spawn>>,
}

impl Injector {
    /// Wrap `original`, which is also the initially active launcher.
    pub fn new(original: Arc<dyn Spawn>) -> Self {
        Self {
            active: RwLock::new(Arc::clone(&original)),
            original,
        }
    }

    /// Make `launcher` the active implementation.
    pub fn set(&self, launcher: Arc<dyn Spawn>) {
        self.replace(launcher);
    }

    /// Make `launcher` active and hand back the one it displaced.
    pub fn replace(&self, launcher: Arc<dyn Spawn>) -> Arc<dyn Spawn> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, launcher)
    }

    /// Restore the launcher this injector was created around.
    pub fn reset(&self) {
        self.set(Arc::clone(&self.original));
    }

    /// The launcher calls are currently forwarded to.
    pub fn active(&self) -> Arc<dyn Spawn> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The launcher this injector was created around.
    pub fn original(&self) -> Arc<dyn Spawn> {
        Arc::clone(&self.original)
    }

    /// Whether something other than the original is active.
    pub fn is_overridden(&self) -> bool {
        !Arc::ptr_eq(&self.active(), &self.original)
    }
}

impl Spawn for Injector {
    fn spawn(&self, command: &[String], options: &SpawnOptions) -> Result<(), BuildError> {
        // Lock released before the call so the launcher may swap itself out
        let active = self.active();
        active.spawn(command, options)
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("overridden", &self.is_overridden())
            .finish()
    }
}

struct Slot {
    current: Arc<dyn Spawn>,
    injector: Option<Arc<Injector>>,
}

static SLOT: LazyLock<Mutex<Slot>> = LazyLock::new(|| {
    Mutex::new(Slot {
        current: Arc::new(DirectSpawn),
        injector: None,
    })
});

fn lock_slot() -> std::sync::MutexGuard<'static, Slot> {
    SLOT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The launcher build tools should call.
pub fn launcher() -> Arc<dyn Spawn> {
    Arc::clone(&lock_slot().current)
}

/// Run one command through the process-wide launcher.
pub fn spawn(command: &[String], options: &SpawnOptions) -> Result<(), BuildError> {
    launcher().spawn(command, options)
}

/// Put an [`Injector`] into the process-wide slot, wrapping what was there.
///
/// Calling this again returns the injector that is already installed, so
/// [`Injector::reset`] keeps reaching the true original.
pub fn install() -> Arc<Injector> {
    install_tracked().0
}

/// [`install`], also reporting whether this call did the installing.
pub(crate) fn install_tracked() -> (Arc<Injector>, bool) {
    let mut slot = lock_slot();
    if let Some(injector) = &slot.injector {
        return (Arc::clone(injector), false);
    }

    let injector = Arc::new(Injector::new(Arc::clone(&slot.current)));
    slot.current = Arc::clone(&injector) as Arc<dyn Spawn>;
    slot.injector = Some(Arc::clone(&injector));
    tracing::debug!("Installed launcher injector");
    (injector, true)
}

/// Remove `injector` from the slot if it is still the installed one.
pub(crate) fn uninstall_if(injector: &Arc<Injector>) -> bool {
    let mut slot = lock_slot();
    let Some(installed) = &slot.injector else {
        return false;
    };
    if !Arc::ptr_eq(installed, injector) {
        return false;
    }

    slot.current = injector.original();
    slot.injector = None;
    tracing::debug!("Removed launcher injector installed by a capture scope");
    true
}

/// Take the injector out of the slot and put its original back.
///
/// Returns `false` when no injector was installed. References to the
/// injector already held by build tools keep forwarding to whatever it has
/// active.
pub fn uninstall() -> bool {
    let mut slot = lock_slot();
    match slot.injector.take() {
        Some(injector) => {
            slot.current = injector.original();
            tracing::debug!("Removed launcher injector");
            true
        }
        None => false,
    }
}

/// The installed injector, if any.
pub fn installed() -> Option<Arc<Injector>> {
    lock_slot().injector.clone()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn Spawn> {
        Arc::new(move |_: &[String], _: &SpawnOptions| -> Result<(), BuildError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_injector_forwards_to_active() {
        let original_calls = Arc::new(AtomicUsize::new(0));
        let override_calls = Arc::new(AtomicUsize::new(0));
        let injector = Injector::new(counting(original_calls.clone()));
        let command = vec!["cc".to_string()];
        let options = SpawnOptions::default();

        injector.spawn(&command, &options).unwrap();
        assert_eq!(original_calls.load(Ordering::SeqCst), 1);
        assert!(!injector.is_overridden());

        injector.set(counting(override_calls.clone()));
        assert!(injector.is_overridden());
        injector.spawn(&command, &options).unwrap();
        assert_eq!(original_calls.load(Ordering::SeqCst), 1);
        assert_eq!(override_calls.load(Ordering::SeqCst), 1);

        injector.reset();
        assert!(!injector.is_overridden());
        injector.spawn(&command, &options).unwrap();
        assert_eq!(original_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_reaches_original_after_many_sets() {
        let original = counting(Arc::new(AtomicUsize::new(0)));
        let injector = Injector::new(Arc::clone(&original));

        for _ in 0..3 {
            injector.set(counting(Arc::new(AtomicUsize::new(0))));
        }
        injector.reset();
        assert!(Arc::ptr_eq(&injector.active(), &original));
    }

    #[test]
    fn test_replace_returns_previous() {
        let original = counting(Arc::new(AtomicUsize::new(0)));
        let other = counting(Arc::new(AtomicUsize::new(0)));
        let injector = Injector::new(Arc::clone(&original));

        let previous = injector.replace(Arc::clone(&other));
        assert!(Arc::ptr_eq(&previous, &original));
        let previous = injector.replace(previous);
        assert!(Arc::ptr_eq(&previous, &other));
        assert!(!injector.is_overridden());
    }

    #[test]
    fn test_held_reference_sees_later_swaps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let injector = Arc::new(Injector::new(Arc::new(DirectSpawn)));
        // What a build tool would keep around
        let held: Arc<dyn Spawn> = injector.clone();

        injector.set(counting(calls.clone()));
        held.spawn(&["anything".to_string()], &SpawnOptions::default())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial_test::serial]
    fn test_uninstall_if_only_removes_matching_injector() {
        uninstall();
        let before = launcher();

        let (injector, installed_now) = install_tracked();
        assert!(installed_now);
        assert!(!install_tracked().1);

        let stranger = Arc::new(Injector::new(Arc::new(DirectSpawn)));
        assert!(!uninstall_if(&stranger));
        assert!(installed().is_some());

        assert!(uninstall_if(&injector));
        assert!(Arc::ptr_eq(&launcher(), &before));
        assert!(!uninstall_if(&injector));
    }
}
