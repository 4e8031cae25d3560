//! Engine iterator built on a [`KeyCursor`].
//!
//! The iterator only remembers the key it stands on. Every read goes back
//! to the live table, and mutations go through the owning engine's
//! contract, so concurrent writers never invalidate it.

use crate::table::KeyCursor;
use polydbm_core::engine::{unbound_error, unordered_error};
use polydbm_core::{Engine, EngineIterator, Error, Record, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Unbound,
    At(Vec<u8>),
    Exhausted,
}

impl Position {
    fn from_key(key: Option<Vec<u8>>) -> Self {
        key.map_or(Position::Exhausted, Position::At)
    }
}

/// Weakly consistent iterator over one engine.
pub struct CursorIterator<'a, C: KeyCursor> {
    engine: &'a dyn Engine,
    cursor: C,
    position: Position,
}

impl<'a, C: KeyCursor> CursorIterator<'a, C> {
    /// Creates an unbound iterator.
    pub fn new(engine: &'a dyn Engine, cursor: C) -> Self {
        Self {
            engine,
            cursor,
            position: Position::Unbound,
        }
    }

    fn require_ordered(&self, operation: &str) -> Result<()> {
        if self.engine.is_ordered() {
            Ok(())
        } else {
            Err(unordered_error(operation))
        }
    }

    fn current_key(&self) -> Result<Vec<u8>> {
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::At(key) => Ok(key.clone()),
            Position::Exhausted => Err(Error::NotFound("iterator is at the end".to_string())),
        }
    }
}

impl<C: KeyCursor> EngineIterator for CursorIterator<'_, C> {
    fn first(&mut self) -> Result<()> {
        self.cursor.rewind()?;
        self.position = Position::from_key(self.cursor.key_after(None, true)?);
        Ok(())
    }

    fn last(&mut self) -> Result<()> {
        self.require_ordered("last")?;
        self.cursor.rewind()?;
        self.position = Position::from_key(self.cursor.key_before(None, true)?);
        Ok(())
    }

    fn jump(&mut self, key: &[u8]) -> Result<()> {
        self.cursor.rewind()?;
        self.position = Position::from_key(self.cursor.key_after(Some(key), true)?);
        Ok(())
    }

    fn jump_lower(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.require_ordered("jump_lower")?;
        self.cursor.rewind()?;
        self.position = Position::from_key(self.cursor.key_before(Some(key), inclusive)?);
        Ok(())
    }

    fn jump_upper(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.require_ordered("jump_upper")?;
        self.cursor.rewind()?;
        self.position = Position::from_key(self.cursor.key_after(Some(key), inclusive)?);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::Exhausted => Ok(()),
            Position::At(key) => {
                self.position = Position::from_key(self.cursor.key_after(Some(key), false)?);
                Ok(())
            }
        }
    }

    fn previous(&mut self) -> Result<()> {
        self.require_ordered("previous")?;
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::Exhausted => Ok(()),
            Position::At(key) => {
                self.position = Position::from_key(self.cursor.key_before(Some(key), false)?);
                Ok(())
            }
        }
    }

    fn get(&mut self) -> Result<Record> {
        loop {
            let key = match &self.position {
                Position::At(key) => key.clone(),
                _ => return Err(Error::NotFound("iterator is not at a record".to_string())),
            };
            if let Some(value) = self.cursor.fetch(&key)? {
                return Ok((key, value));
            }
            // removed since we got here
            self.position = Position::from_key(self.cursor.key_after(Some(&key), false)?);
        }
    }

    fn set(&mut self, value: &[u8]) -> Result<()> {
        self.current_key()?;
        let (key, _) = self.get()?;
        self.engine.set(&key, value, true)?;
        self.next()
    }

    fn remove(&mut self) -> Result<()> {
        self.current_key()?;
        let (key, _) = self.get()?;
        self.engine.remove(&key)?;
        self.next()
    }
}
