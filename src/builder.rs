//! # Builder utilities
//!
//! This module contains utilities to ease and standardize the writing of builders
//! such as: [crate::metadata::TableBuilder] or [crate::private_reader::PrivateReaderBuilder]
//!

use std::error;

/// A trait for builder ad-hoc polymorphism
pub trait With<Input, Output = Self> {
    fn with(self, input: Input) -> Output;
}

/// Implement With for the unit type
impl<T, W: Default + With<T>> With<T, W> for () {
    fn with(self, input: T) -> W {
        W::default().with(input)
    }
}

pub trait WithIterator<Input> {
    fn with_iter<I: IntoIterator<Item = Input>>(self, iter: I) -> Self;
}

impl<Input, W: With<Input>> WithIterator<Input> for W {
    fn with_iter<I: IntoIterator<Item = Input>>(self, iter: I) -> Self {
        iter.into_iter().fold(self, |w, i| w.with(i))
    }
}

/// A trait enabling build when a builder is ready
pub trait Ready<Output>: Sized {
    type Error: error::Error;
    /// Build and panic in case of error
    fn build(self) -> Output {
        match self.try_build() {
            Ok(output) => output,
            Err(err) => panic!("Cannot build: {err}"),
        }
    }
    /// Try to build
    fn try_build(self) -> Result<Output, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Empty;

    impl fmt::Display for Empty {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "empty")
        }
    }

    impl error::Error for Empty {}

    #[derive(Default)]
    struct Names(Vec<String>);

    impl With<&str> for Names {
        fn with(mut self, input: &str) -> Self {
            self.0.push(input.to_string());
            self
        }
    }

    impl Ready<String> for Names {
        type Error = Empty;

        fn try_build(self) -> Result<String, Self::Error> {
            if self.0.is_empty() {
                Err(Empty)
            } else {
                Ok(self.0.join(", "))
            }
        }
    }

    #[test]
    fn test_with_iter() {
        let names: Names = ().with("age");
        let names = names.with_iter(["income", "married"]);
        assert_eq!(names.build(), "age, income, married");
    }

    #[test]
    fn test_try_build() {
        assert!(Names::default().try_build().is_err());
    }
}
