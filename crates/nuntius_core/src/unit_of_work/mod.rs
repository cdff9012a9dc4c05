mod memory;
pub use memory::*;

use std::{convert::Infallible, error::Error, sync::Arc};

/// The transactional scope that groups every consumer effect of one event.
///
/// The dispatcher calls `begin` once selected consumers are known, then either
/// `commit` after all of them succeeded or `rollback` after the first failure.
/// Implementations stage whatever their consumers write in between.
pub trait UnitOfWork: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn begin(&self) -> Result<(), Self::Error>;

    fn commit(&self) -> Result<(), Self::Error>;

    fn rollback(&self) -> Result<(), Self::Error>;
}

/// No transactional collaborator: effects are applied as consumers run.
impl UnitOfWork for () {
    type Error = Infallible;

    fn begin(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn commit(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<U: UnitOfWork> UnitOfWork for Arc<U> {
    type Error = U::Error;

    fn begin(&self) -> Result<(), Self::Error> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), Self::Error> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), Self::Error> {
        (**self).rollback()
    }
}
