//! Iterator bound to an open [`DbManager`](crate::DbManager).

use polydbm_core::{EngineIterator, Record, Result};

/// Cursor over the records of a database.
///
/// The iterator borrows the manager, so the database cannot be closed while
/// it is alive. See [`EngineIterator`] for the consistency guarantees.
///
/// # Examples
///
/// ```rust,no_run
/// use polydbm::{DbManager, OpenParams};
///
/// # fn main() -> polydbm::Result<()> {
/// let mut db = DbManager::new();
/// db.open("words.tkt", true, &OpenParams::new())?;
/// let mut iter = db.make_iterator()?;
/// iter.jump_str("m")?;
/// while let Some((key, value)) = iter.step_str()? {
///     println!("{} = {}", key, value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DbIterator<'a> {
    inner: Box<dyn EngineIterator + 'a>,
}

impl<'a> DbIterator<'a> {
    pub(crate) fn new(inner: Box<dyn EngineIterator + 'a>) -> Self {
        Self { inner }
    }

    /// Positions at the first record.
    pub fn first(&mut self) -> Result<()> {
        self.inner.first()
    }

    /// Positions at the last record. Ordered databases only.
    pub fn last(&mut self) -> Result<()> {
        self.inner.last()
    }

    /// Positions at `key`, or the record after it.
    pub fn jump(&mut self, key: &[u8]) -> Result<()> {
        self.inner.jump(key)
    }

    pub fn jump_lower(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.inner.jump_lower(key, inclusive)
    }

    pub fn jump_upper(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.inner.jump_upper(key, inclusive)
    }

    pub fn next(&mut self) -> Result<()> {
        self.inner.next()
    }

    pub fn previous(&mut self) -> Result<()> {
        self.inner.previous()
    }

    /// Returns the record at the current position.
    pub fn get(&mut self) -> Result<Record> {
        self.inner.get()
    }

    pub fn get_key(&mut self) -> Result<Vec<u8>> {
        self.inner.get_key()
    }

    pub fn get_value(&mut self) -> Result<Vec<u8>> {
        self.inner.get_value()
    }

    /// Replaces the current value, then moves to the next record.
    pub fn set(&mut self, value: &[u8]) -> Result<()> {
        self.inner.set(value)
    }

    /// Removes the current record, then moves to the next record.
    pub fn remove(&mut self) -> Result<()> {
        self.inner.remove()
    }

    /// Reads the current record and advances. `None` once exhausted.
    pub fn step(&mut self) -> Result<Option<Record>> {
        self.inner.step()
    }

    pub fn jump_str(&mut self, key: &str) -> Result<()> {
        self.inner.jump(key.as_bytes())
    }

    /// Like [`get`](Self::get), decoding both sides lossily as UTF-8.
    pub fn get_str(&mut self) -> Result<(String, String)> {
        let (key, value) = self.inner.get()?;
        Ok(lossy_pair(key, value))
    }

    pub fn set_str(&mut self, value: &str) -> Result<()> {
        self.inner.set(value.as_bytes())
    }

    pub fn step_str(&mut self) -> Result<Option<(String, String)>> {
        Ok(self.inner.step()?.map(|(key, value)| lossy_pair(key, value)))
    }
}

fn lossy_pair(key: Vec<u8>, value: Vec<u8>) -> (String, String) {
    (
        String::from_utf8_lossy(&key).into_owned(),
        String::from_utf8_lossy(&value).into_owned(),
    )
}
