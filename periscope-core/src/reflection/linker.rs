//! Manual descriptor linking.
//!
//! Some servers hand out file descriptor sets that are incomplete: the files
//! arrive in arbitrary order, and transitively imported files may be missing
//! entirely. The most common offender is `protoc-gen-validate`'s
//! `validate.proto`, which services reference for annotations but rarely
//! serve. This module links whatever can be linked:
//!
//! 1. Collect the files into a map by name and inject stub files for known
//!    missing imports (`validate.proto` by default, extensible via
//!    [`link_with_stubs`]).
//! 2. Sweep the set repeatedly, registering every file whose dependencies are
//!    already in the pool and skipping the rest.
//! 3. Stop when a whole sweep makes no progress. The sweep count is bounded
//!    by the number of files, so termination is guaranteed.

use prost_reflect::DescriptorPool;
use prost_types::FileDescriptorProto;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Import path services reference for validation annotations without the
/// server ever returning the file.
pub const VALIDATE_PROTO_PATH: &str = "protoc-gen-validate/validate/validate.proto";

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("The server returned no file descriptors")]
    NoDescriptors,

    #[error("Could not resolve any file descriptor; unresolved files: {0:?}")]
    NothingResolved(Vec<String>),
}

/// The stand-in for `validate.proto`: an empty proto3 file with the right
/// name and package, enough for referencing messages to build.
pub fn validate_stub() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(VALIDATE_PROTO_PATH.to_string()),
        package: Some("validate".to_string()),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// Links `files` into a [`DescriptorPool`], with the default stub set.
pub fn link(files: Vec<FileDescriptorProto>) -> Result<DescriptorPool, LinkError> {
    link_with_stubs(files, vec![validate_stub()])
}

/// Links `files` into a [`DescriptorPool`], injecting `stubs` for imports the
/// server is known not to serve. A stub is only used when the real file is
/// absent from `files`.
pub fn link_with_stubs(
    files: Vec<FileDescriptorProto>,
    stubs: Vec<FileDescriptorProto>,
) -> Result<DescriptorPool, LinkError> {
    if files.is_empty() {
        return Err(LinkError::NoDescriptors);
    }

    let mut pending: HashMap<String, FileDescriptorProto> = HashMap::new();
    for file in files {
        if let Some(name) = file.name.clone() {
            pending.insert(name, file);
        }
    }
    for stub in stubs {
        if let Some(name) = stub.name.clone()
            && !pending.contains_key(&name)
        {
            pending.insert(name, stub);
        }
    }

    let mut pool = DescriptorPool::new();
    let mut registered = 0usize;

    // Fixed point: each sweep registers every file whose imports are already
    // present; a sweep with no progress means the remainder is unlinkable.
    loop {
        let mut progressed = false;

        let names: Vec<String> = pending.keys().cloned().collect();
        for name in names {
            let Some(file) = pending.get(&name) else {
                continue;
            };
            match pool.add_file_descriptor_proto(file.clone()) {
                Ok(_) => {
                    pending.remove(&name);
                    registered += 1;
                    progressed = true;
                }
                Err(err) => {
                    debug!(file = %name, error = %err, "descriptor not linkable yet, will retry");
                }
            }
        }

        if !progressed {
            break;
        }
    }

    if registered == 0 {
        return Err(LinkError::NothingResolved(pending.into_keys().collect()));
    }
    if !pending.is_empty() {
        warn!(
            unresolved = ?pending.keys().collect::<Vec<_>>(),
            "some file descriptors could not be linked"
        );
    }

    Ok(pool)
}
