use mender_core::Fix;

/// Asked once per fix when a batch runs with `interactive` set.
pub trait FixConfirmer: Send {
    fn confirm(&mut self, fix: &Fix) -> bool;
}

/// Headless confirmer that accepts every fix.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl FixConfirmer for AlwaysConfirm {
    fn confirm(&mut self, _fix: &Fix) -> bool {
        true
    }
}

impl<F> FixConfirmer for F
where
    F: FnMut(&Fix) -> bool + Send,
{
    fn confirm(&mut self, fix: &Fix) -> bool {
        self(fix)
    }
}
