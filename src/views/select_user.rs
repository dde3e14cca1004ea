//! User selection

use super::{class_len_of, count_classes, origin_of, scan_labels};
use crate::data::{Sample, StreamSpec, GARBAGE_USER_ID};
use crate::error::{Result, SampleError};
use crate::samples::{sealed, Samples};
use tracing::warn;

/// View restricted to a subset of users
///
/// Selected users are renumbered `0..m` in selection order. Samples of
/// the garbage user are dropped.
pub struct SelectUser<'a, S: Samples + ?Sized> {
    samples: &'a S,
    selection: Vec<u32>,
    origins: Vec<usize>,
    labels: Vec<u32>,
    class_sizes: Vec<usize>,
}

impl<'a, S: Samples + ?Sized> SelectUser<'a, S> {
    /// Create a view selecting every user
    pub fn new(samples: &'a S) -> Result<Self> {
        let all: Vec<u32> = (0..samples.user_count() as u32).collect();
        let mut view = Self {
            samples,
            selection: Vec::new(),
            origins: Vec::new(),
            labels: Vec::new(),
            class_sizes: Vec::new(),
        };
        view.set_selection(&all)?;
        Ok(view)
    }

    /// Select `users`, renumbered in the given order
    pub fn set_selection(&mut self, users: &[u32]) -> Result<()> {
        let n_users = self.samples.user_count();
        let mut relabel = vec![None; n_users];
        for (new, &user) in users.iter().enumerate() {
            if user as usize >= n_users {
                warn!("user index {} out of range", user);
                return Err(SampleError::out_of_range("user", user as usize, n_users));
            }
            if relabel[user as usize].is_some() {
                warn!("user {} selected twice", user);
                return Err(SampleError::invalid(
                    "users",
                    format!("user {} selected twice", user),
                ));
            }
            relabel[user as usize] = Some(new as u32);
        }

        let mut origins = Vec::new();
        let mut labels = Vec::new();
        let mut classes = Vec::new();
        for (i, l) in scan_labels(self.samples)?.iter().enumerate() {
            if l.user_id == GARBAGE_USER_ID {
                continue;
            }
            if let Some(new) = relabel.get(l.user_id as usize).copied().flatten() {
                origins.push(i);
                labels.push(new);
                classes.push(l.class_id);
            }
        }

        self.selection = users.to_vec();
        self.origins = origins;
        self.labels = labels;
        self.class_sizes = count_classes(classes, self.samples.class_count());
        Ok(())
    }

    /// Select every user not in `users`, in ascending order
    pub fn set_selection_complement(&mut self, users: &[u32]) -> Result<()> {
        let n_users = self.samples.user_count();
        if let Some(&user) = users.iter().find(|&&u| u as usize >= n_users) {
            warn!("user index {} out of range", user);
            return Err(SampleError::out_of_range("user", user as usize, n_users));
        }
        let rest: Vec<u32> = (0..n_users as u32).filter(|u| !users.contains(u)).collect();
        self.set_selection(&rest)
    }

    /// Backing user ids in selection order
    pub fn selection(&self) -> &[u32] {
        &self.selection
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for SelectUser<'_, S> {}

impl<S: Samples + ?Sized> Samples for SelectUser<'_, S> {
    fn len(&self) -> usize {
        self.origins.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        class_len_of(&self.class_sizes, class)
    }

    fn class_count(&self) -> usize {
        self.samples.class_count()
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        self.samples.class_name(class)
    }

    fn user_count(&self) -> usize {
        self.selection.len()
    }

    fn user_name(&self, user: u32) -> Result<&str> {
        if user == GARBAGE_USER_ID {
            return self.samples.user_name(user);
        }
        match self.selection.get(user as usize) {
            Some(&origin) => self.samples.user_name(origin),
            None => {
                warn!("user index {} out of range", user);
                Err(SampleError::out_of_range(
                    "user",
                    user as usize,
                    self.selection.len(),
                ))
            }
        }
    }

    fn stream_count(&self) -> usize {
        self.samples.stream_count()
    }

    fn stream(&self, index: usize) -> Result<&StreamSpec> {
        self.samples.stream(index)
    }

    fn has_missing_data(&self) -> bool {
        self.samples.has_missing_data()
    }

    fn supports_shallow_copy(&self) -> bool {
        self.samples.supports_shallow_copy()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let mut sample = self.samples.get(origin_of(&self.origins, index)?)?;
        sample.user_id = self.labels[index];
        Ok(sample)
    }
}
