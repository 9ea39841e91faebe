// crates/klaro-geo-core/src/settings/file.rs
use super::SettingsBackend;
use crate::error::{KlaroGeoError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One `<key>.json` file per setting inside a directory.
///
/// Writes go to `<key>.json.tmp` and are renamed into place, so readers see
/// either the old or the new value. Every write holds an exclusive `flock`
/// on `<key>.lock`, so separate processes sharing the directory serialize
/// their read-modify-writes. Within one backend a mutex orders them first.
///
/// A file that does not parse as JSON is logged and read as absent.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_key(key: &str) -> Result<()> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(KlaroGeoError::InvalidData(format!("invalid settings key '{key}'")));
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the cross-process lock for `key`. Hold the mutex first.
    fn lock_key(&self, key: &str) -> Result<KeyLock> {
        Self::check_key(key)?;
        fs::create_dir_all(&self.dir)?;
        KeyLock::acquire(&self.dir.join(format!("{key}.lock")))
    }

    fn read(path: &Path) -> Result<Option<Value>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "stored setting is not valid JSON; ignoring");
                Ok(None)
            }
        }
    }

    fn write(&self, path: &Path, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "setting written");
        Ok(())
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SettingsBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Self::read(&self.path_for(key)?)
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.lock();
        let _key_lock = self.lock_key(key)?;
        self.write(&path, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if !self.dir.exists() {
            return Ok(());
        }
        let _guard = self.lock();
        let _key_lock = self.lock_key(key)?;
        Self::remove(&path)
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<Value> {
        let path = self.path_for(key)?;
        let _guard = self.lock();
        let _key_lock = self.lock_key(key)?;
        let next = f(Self::read(&path)?)?;
        self.write(&path, &next)?;
        Ok(next)
    }

    fn update_many(
        &self,
        keys: &[&str],
        f: &mut dyn FnMut(&mut BTreeMap<String, Option<Value>>) -> Result<()>,
    ) -> Result<()> {
        let mut paths = BTreeMap::new();
        for key in keys {
            paths.insert(key.to_string(), self.path_for(key)?);
        }

        let _guard = self.lock();
        // Locks are always taken in key order.
        let mut key_locks = Vec::with_capacity(paths.len());
        for key in paths.keys() {
            key_locks.push(self.lock_key(key)?);
        }

        let mut before = BTreeMap::new();
        for (key, path) in &paths {
            before.insert(key.clone(), Self::read(path)?);
        }
        let mut after = before.clone();
        f(&mut after)?;

        for (key, path) in &paths {
            let old = before.get(key).and_then(Option::as_ref);
            match after.remove(key) {
                Some(Some(new)) if Some(&new) != old => self.write(path, &new)?,
                Some(None) if old.is_some() => Self::remove(path)?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Exclusive advisory lock on a `<key>.lock` file, released on drop.
///
/// The lock file itself is never removed: a process blocked on the old
/// inode would otherwise hold a lock nobody else sees.
#[derive(Debug)]
struct KeyLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl KeyLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            loop {
                // LOCK_EX without LOCK_NB: wait for the current holder
                let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != ErrorKind::Interrupted {
                    return Err(err.into());
                }
            }
        }

        Ok(Self { file })
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_survive_a_new_backend() {
        let dir = tempfile::tempdir().unwrap();
        FileBackend::new(dir.path()).set("klaro_geo_gtm_settings", &json!({ "oninit": "x" })).unwrap();

        let again = FileBackend::new(dir.path());
        assert_eq!(
            again.get("klaro_geo_gtm_settings").unwrap(),
            Some(json!({ "oninit": "x" }))
        );
        assert!(!dir.path().join("klaro_geo_gtm_settings.json.tmp").exists());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(matches!(backend.get("../etc"), Err(KlaroGeoError::InvalidData(_))));
        assert!(matches!(backend.set("", &json!(1)), Err(KlaroGeoError::InvalidData(_))));
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let backend = FileBackend::new(dir.path());
        assert_eq!(backend.get("broken").unwrap(), None);

        backend.update("broken", &mut |current| {
            assert!(current.is_none());
            Ok(json!([]))
        })
        .unwrap();
        assert_eq!(backend.get("broken").unwrap(), Some(json!([])));
    }

    #[test]
    fn missing_key_deletes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested"));
        backend.delete("absent").unwrap();
        assert_eq!(backend.get("absent").unwrap(), None);
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn writes_leave_lock_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.update("counter", &mut |_| Ok(json!(1))).unwrap();
        assert!(dir.path().join("counter.lock").exists());

        // A second backend on the same directory can take the lock again.
        FileBackend::new(dir.path())
            .update("counter", &mut |v| Ok(json!(v.and_then(|v| v.as_i64()).unwrap_or(0) + 1)))
            .unwrap();
        assert_eq!(backend.get("counter").unwrap(), Some(json!(2)));
    }

    #[test]
    fn update_many_writes_only_changed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.set("a", &json!(1)).unwrap();
        backend.set("b", &json!(2)).unwrap();
        let untouched = fs::metadata(dir.path().join("a.json")).unwrap().modified().unwrap();

        backend
            .update_many(&["b", "a", "c"], &mut |values| {
                assert_eq!(values["a"], Some(json!(1)));
                assert_eq!(values["c"], None);
                values.insert("b".into(), None);
                values.insert("c".into(), Some(json!(3)));
                Ok(())
            })
            .unwrap();

        assert_eq!(backend.get("a").unwrap(), Some(json!(1)));
        assert_eq!(backend.get("b").unwrap(), None);
        assert_eq!(backend.get("c").unwrap(), Some(json!(3)));
        assert_eq!(
            fs::metadata(dir.path().join("a.json")).unwrap().modified().unwrap(),
            untouched
        );

        let failed = backend.update_many(&["a"], &mut |values| {
            values.insert("a".into(), Some(json!(9)));
            Err(KlaroGeoError::InvalidData("no".into()))
        });
        assert!(failed.is_err());
        assert_eq!(backend.get("a").unwrap(), Some(json!(1)));
    }
}
