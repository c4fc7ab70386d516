//! The three optical channels of the detector and a fixed map over them.

use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Wavelength {
    Red,
    Green,
    Infrared,
}

impl Wavelength {
    pub const ALL: [Wavelength; 3] = [Wavelength::Red, Wavelength::Green, Wavelength::Infrared];

    /// Field label on the wire and column prefix in the store.
    pub fn label(self) -> &'static str {
        match self {
            Wavelength::Red => "R",
            Wavelength::Green => "G",
            Wavelength::Infrared => "IR",
        }
    }

    /// Name used in operator-facing messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Wavelength::Red => "RED",
            Wavelength::Green => "GREEN",
            Wavelength::Infrared => "IR",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "R" => Some(Wavelength::Red),
            "G" => Some(Wavelength::Green),
            "IR" => Some(Wavelength::Infrared),
            _ => None,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            Wavelength::Red => 0,
            Wavelength::Green => 1,
            Wavelength::Infrared => 2,
        }
    }
}

impl std::fmt::Display for Wavelength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per wavelength, always in R, G, IR order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerWavelength<T>([T; 3]);

impl<T> PerWavelength<T> {
    pub fn new(red: T, green: T, infrared: T) -> Self {
        Self([red, green, infrared])
    }

    pub fn from_fn(mut f: impl FnMut(Wavelength) -> T) -> Self {
        Self([
            f(Wavelength::Red),
            f(Wavelength::Green),
            f(Wavelength::Infrared),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Wavelength, &T)> {
        Wavelength::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Wavelength, &T) -> U) -> PerWavelength<U> {
        PerWavelength::from_fn(|w| f(w, &self[w]))
    }

    pub fn all(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.0.iter().all(|v| pred(v))
    }

    pub fn any(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.0.iter().any(|v| pred(v))
    }
}

impl<T> Index<Wavelength> for PerWavelength<T> {
    type Output = T;
    fn index(&self, w: Wavelength) -> &T {
        &self.0[w.index()]
    }
}

impl<T> IndexMut<Wavelength> for PerWavelength<T> {
    fn index_mut(&mut self, w: Wavelength) -> &mut T {
        &mut self.0[w.index()]
    }
}
