//! Per-type dispatch descriptors
//!
//! A [`TypeDescriptor`] is created the first time a reference names a type.
//! Its member table is filled lazily: every declared signature gets the next
//! member id when it is first requested.

use crate::jsni::{CONSTRUCTOR_MEMBER, WILDCARD_PARAMS};
use crate::loader::runtime::{RuntimeType, TypeHandle};
use devshell_bytecode::descriptor::params_of;
use devshell_bytecode::CONSTRUCTOR_NAME;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Largest member id a descriptor hands out
pub const MAX_MEMBER_ID: i32 = 0xFFFF;

/// Kind of a resolved member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Field
    Field,
    /// Method
    Method,
    /// Constructor
    Constructor,
}

/// A member a handle can dispatch to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    /// Binary name of the type that declares the member
    pub declaring_type: String,
    /// Kind of member
    pub kind: MemberKind,
    /// Name as declared (`<init>` for constructors)
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
    /// Whether the member is static
    pub is_static: bool,
}

#[derive(Debug, Default)]
struct MemberTable {
    /// Requested signature to member id
    ids: FxHashMap<String, i32>,
    /// Resolved member to member id, shared by every spelling
    by_member: FxHashMap<Member, i32>,
    members: Vec<Member>,
}

/// Dispatch information for one type
#[derive(Debug)]
pub struct TypeDescriptor {
    type_id: u32,
    runtime: TypeHandle,
    members: Mutex<MemberTable>,
}

impl TypeDescriptor {
    /// Create a descriptor for a defined type
    pub fn new(type_id: u32, runtime: TypeHandle) -> Self {
        Self {
            type_id,
            runtime,
            members: Mutex::new(MemberTable::default()),
        }
    }

    /// Type id within the session
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Binary name of the described type
    pub fn binary_name(&self) -> &str {
        self.runtime.binary_name()
    }

    /// The described type
    pub fn runtime_type(&self) -> &TypeHandle {
        &self.runtime
    }

    /// Member id for a member signature, assigning one on first request
    ///
    /// Signatures are `name` for fields and `name(params)` for methods and
    /// constructors (`new(params)`). Returns `-1` when no member of the type
    /// or its supertypes matches.
    pub fn member_id(&self, signature: &str) -> i32 {
        let mut table = self.members.lock();
        if let Some(&id) = table.ids.get(signature) {
            return id;
        }

        let Some(member) = find_member(&self.runtime, signature) else {
            return -1;
        };

        // Different spellings of one member share its id
        let existing = table.by_member.get(&member).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                if table.members.len() as i32 > MAX_MEMBER_ID {
                    return -1;
                }
                let id = table.members.len() as i32;
                table.by_member.insert(member.clone(), id);
                table.members.push(member);
                id
            }
        };
        table.ids.insert(signature.to_string(), id);
        id
    }

    /// Member previously assigned the given id
    pub fn member(&self, member_id: i32) -> Option<Member> {
        if member_id < 0 {
            return None;
        }
        self.members.lock().members.get(member_id as usize).cloned()
    }

    /// Number of members resolved so far
    pub fn member_count(&self) -> usize {
        self.members.lock().members.len()
    }
}

/// Search a type and its supertypes for a member signature
fn find_member(runtime: &RuntimeType, signature: &str) -> Option<Member> {
    let Some(open) = signature.find('(') else {
        return find_field(runtime, signature);
    };
    let name = &signature[..open];
    let params = signature[open + 1..].strip_suffix(')')?;

    if name == CONSTRUCTOR_MEMBER {
        // Constructors are never inherited
        return find_method(runtime, CONSTRUCTOR_NAME, params, MemberKind::Constructor);
    }

    runtime
        .lineage()
        .into_iter()
        .find_map(|t| find_method(t, name, params, MemberKind::Method))
}

fn find_field(runtime: &RuntimeType, name: &str) -> Option<Member> {
    runtime.lineage().into_iter().find_map(|t| {
        t.image()
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| Member {
                declaring_type: t.binary_name().to_string(),
                kind: MemberKind::Field,
                name: f.name.clone(),
                descriptor: f.descriptor.clone(),
                is_static: f.is_static(),
            })
    })
}

/// Find a method declared directly by `t`. A wildcard parameter list only
/// matches when the name is not overloaded there.
fn find_method(t: &RuntimeType, name: &str, params: &str, kind: MemberKind) -> Option<Member> {
    let mut candidates = t.image().methods.iter().filter(|m| m.name == name);
    let found = if params == WILDCARD_PARAMS {
        let first = candidates.next()?;
        if candidates.next().is_some() {
            log::debug!("'{}' is overloaded in {}; wildcard does not apply", name, t.binary_name());
            return None;
        }
        first
    } else {
        candidates.find(|m| params_of(&m.descriptor) == params)?
    };

    Some(Member {
        declaring_type: t.binary_name().to_string(),
        kind,
        name: found.name.clone(),
        descriptor: found.descriptor.clone(),
        is_static: found.is_static(),
    })
}
