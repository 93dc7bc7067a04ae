use super::report::{ConfigWarning, EnrichmentReport};
use crate::toolkit::{Toolkit, ToolkitError};

/// One pipeline run against a toolkit.
///
/// Every temporary object the run creates is tracked on a stack. Objects
/// consumed on the success path are released explicitly; whatever is still
/// pending when the session is dropped (an error cut the run short) is
/// deleted in reverse creation order.
pub struct Session<'a, T: Toolkit> {
    toolkit: &'a mut T,
    pending: Vec<String>,
    report: EnrichmentReport,
}

impl<'a, T: Toolkit> Session<'a, T> {
    pub fn new(toolkit: &'a mut T) -> Self {
        Self {
            toolkit,
            pending: Vec::new(),
            report: EnrichmentReport::new(),
        }
    }

    pub fn toolkit(&mut self) -> &mut T {
        self.toolkit
    }

    pub fn report(&mut self) -> &mut EnrichmentReport {
        &mut self.report
    }

    pub fn take_report(&mut self) -> EnrichmentReport {
        std::mem::take(&mut self.report)
    }

    /// Temporary objects owned by this session, oldest first
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn owns(&self, name: &str) -> bool {
        self.pending.iter().any(|pending| pending == name)
    }

    /// Take ownership of a freshly created temporary object
    pub fn track(&mut self, name: impl Into<String>) {
        self.pending.push(name.into());
    }

    /// Delete an object this session owns.
    ///
    /// Objects the session did not create are left alone.
    pub fn release(&mut self, name: &str) -> Result<(), ToolkitError> {
        let Some(position) = self.pending.iter().rposition(|pending| pending == name) else {
            tracing::debug!("Not releasing {}: not created by this run", name);
            return Ok(());
        };
        self.pending.remove(position);
        self.toolkit.delete(name)?;
        tracing::debug!("Deleted temporary object {}", name);
        Ok(())
    }

    /// First free name in the sequence `base`, `base1`, `base2`, ...
    ///
    /// Names taken by objects this session does not own are reported as
    /// stale leftovers.
    pub fn unique_name(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.toolkit.exists(&candidate) {
            if !self.owns(&candidate) {
                self.report.warn(ConfigWarning::StaleWorkspaceObject {
                    name: candidate.clone(),
                });
            }
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        candidate
    }
}

impl<T: Toolkit> Drop for Session<'_, T> {
    fn drop(&mut self) {
        while let Some(name) = self.pending.pop() {
            match self.toolkit.delete(&name) {
                Ok(()) => tracing::info!("Cleaned up temporary object {}", name),
                Err(e) => tracing::warn!("Failed to clean up {}: {}", name, e),
            }
        }
    }
}
