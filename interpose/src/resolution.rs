//! 方法解析
//!
//! 把接口（含继承的接口）的每个方法与实现类型上的具体方法配对。

use crate::descriptor::{ConcreteMethod, MethodSignature, TypeDescriptor};
use crate::error::{ConfigurationError, ProxyResult};
use crate::value::TypeInfo;
use std::collections::HashSet;

/// 接口方法与实现它的具体方法
#[derive(Debug, Clone, Copy)]
pub struct MethodPair<'a> {
    /// 声明该方法的接口（可能是被继承的接口）
    pub declaring: &'a TypeDescriptor,
    pub interface_method: &'a MethodSignature,
    pub concrete: &'a ConcreteMethod,
}

impl MethodPair<'_> {
    /// `Interface::method` 形式的限定名
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring.name(), self.interface_method.name())
    }
}

/// 解析接口与实现的方法对
///
/// 接口自身的方法在前，继承的接口按深度优先顺序在后；
/// 菱形继承中重复出现的接口方法只保留一次
pub fn resolve<'a>(
    interface: &'a TypeDescriptor,
    implementation: &'a TypeDescriptor,
) -> ProxyResult<Vec<MethodPair<'a>>> {
    if !interface.is_interface() {
        return Err(ConfigurationError::NotAnInterface {
            name: interface.to_string(),
        }
        .into());
    }
    if implementation.is_interface() {
        return Err(not_assignable(
            interface,
            implementation,
            "the implementation is itself an interface".to_string(),
        ));
    }
    if !implementation.is_assignable_to(interface) {
        return Err(not_assignable(
            interface,
            implementation,
            format!("{} does not implement {}", implementation, interface),
        ));
    }

    let mut declared = Vec::new();
    let mut seen = HashSet::new();
    flatten(interface, &mut seen, &mut declared);

    let mut pairs = Vec::with_capacity(declared.len());
    for (declaring, signature) in declared {
        let concrete = find_concrete(declaring, signature, implementation).ok_or_else(|| {
            not_assignable(
                interface,
                implementation,
                format!("no method implements {}::{}", declaring.name(), signature.name()),
            )
        })?;
        signature
            .check_conforms(concrete.signature())
            .map_err(|reason| not_assignable(interface, implementation, reason))?;
        pairs.push(MethodPair {
            declaring,
            interface_method: signature,
            concrete,
        });
    }

    tracing::trace!(
        "Resolved {} method(s) of {} on {}",
        pairs.len(),
        interface,
        implementation
    );
    Ok(pairs)
}

fn flatten<'a>(
    interface: &'a TypeDescriptor,
    seen: &mut HashSet<(TypeInfo, &'a str)>,
    out: &mut Vec<(&'a TypeDescriptor, &'a MethodSignature)>,
) {
    for signature in interface.signatures() {
        if seen.insert((interface.key(), signature.name())) {
            out.push((interface, signature));
        }
    }
    for parent in interface.extends() {
        flatten(parent, seen, out);
    }
}

/// 显式映射优先；否则取没有显式映射的同名方法
fn find_concrete<'a>(
    declaring: &TypeDescriptor,
    signature: &MethodSignature,
    implementation: &'a TypeDescriptor,
) -> Option<&'a ConcreteMethod> {
    let methods = implementation.methods();
    methods
        .iter()
        .find(|method| {
            method.explicit_target().is_some_and(|target| {
                target.interface() == declaring.key() && target.method() == signature.name()
            })
        })
        .or_else(|| {
            methods
                .iter()
                .find(|method| method.explicit_target().is_none() && method.name() == signature.name())
        })
}

fn not_assignable(
    interface: &TypeDescriptor,
    implementation: &TypeDescriptor,
    reason: String,
) -> crate::error::ProxyError {
    ConfigurationError::NotAssignable {
        interface: interface.to_string(),
        implementation: implementation.to_string(),
        reason,
    }
    .into()
}
