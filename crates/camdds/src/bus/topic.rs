// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Topic handles.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bus::codec::BusData;

/// A named, typed data channel.
///
/// Cheap to clone; the pairing of topic name and [`BusData::type_name`]
/// forms the matching key between writers and readers.
pub struct Topic<T: BusData> {
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BusData> Topic<T> {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        T::type_name()
    }
}

impl<T: BusData> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<T: BusData> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("type", &T::type_name())
            .finish()
    }
}
