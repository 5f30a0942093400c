//! Function registry.
//!
//! The registry is built once (usually with `FunctionRegistry::with_builtins`)
//! and handed to the compiler by reference.

pub mod aggregate;
pub mod scalar;

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use sluice_error::{DbError, Result};
use tracing::debug;

use self::aggregate::AggregateFunction;
use crate::explain::DisplayList;
use crate::scalar::{DataType, ScalarValue};
use crate::statistics::ErrorCode;

/// A declared function argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArgument {
    pub name: &'static str,
    pub datatype: DataType,
    /// Value used when the caller doesn't provide the argument.
    pub default: Option<ScalarValue>,
    /// Absorbs all remaining positional arguments. Only valid as the last
    /// argument.
    pub variadic: bool,
}

impl FunctionArgument {
    pub const fn required(name: &'static str, datatype: DataType) -> Self {
        FunctionArgument {
            name,
            datatype,
            default: None,
            variadic: false,
        }
    }

    pub fn optional(name: &'static str, datatype: DataType, default: ScalarValue) -> Self {
        FunctionArgument {
            name,
            datatype,
            default: Some(default),
            variadic: false,
        }
    }

    pub const fn variadic(name: &'static str, datatype: DataType) -> Self {
        FunctionArgument {
            name,
            datatype,
            default: None,
            variadic: true,
        }
    }

    fn accepts(&self, have: DataType) -> bool {
        self.datatype == DataType::Any
            || have == self.datatype
            || matches!(have, DataType::Null | DataType::Any)
    }
}

impl fmt::Display for FunctionArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variadic {
            write!(f, "...")?;
        }
        write!(f, "{}: {}", self.name, self.datatype)?;
        if let Some(default) = &self.default {
            write!(f, " = {default}")?;
        }
        Ok(())
    }
}

/// Argument types at a call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentTypes {
    pub positional: Vec<DataType>,
    pub named: Vec<(String, DataType)>,
}

impl ArgumentTypes {
    pub fn positional(types: impl IntoIterator<Item = DataType>) -> Self {
        ArgumentTypes {
            positional: types.into_iter().collect(),
            named: Vec::new(),
        }
    }

    fn named_type(&self, name: &str) -> Option<DataType> {
        self.named
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| *t)
    }
}

impl fmt::Display for ArgumentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for t in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{t}")?;
        }
        for (name, t) in &self.named {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name} => {t}")?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: &'static str,
    pub arguments: Vec<FunctionArgument>,
    /// `DataType::Any` marks a generic return type, resolved from the
    /// arguments at the call site.
    pub return_type: DataType,
}

impl Signature {
    pub fn new(
        name: &'static str,
        arguments: impl Into<Vec<FunctionArgument>>,
        return_type: DataType,
    ) -> Self {
        Signature {
            name,
            arguments: arguments.into(),
            return_type,
        }
    }

    /// Arguments excluding a trailing variadic one.
    pub fn fixed_arguments(&self) -> &[FunctionArgument] {
        match self.arguments.last() {
            Some(last) if last.variadic => &self.arguments[..self.arguments.len() - 1],
            _ => &self.arguments,
        }
    }

    pub fn variadic_argument(&self) -> Option<&FunctionArgument> {
        self.arguments.last().filter(|a| a.variadic)
    }

    /// Check if the call site argument types satisfy this signature.
    pub fn matches(&self, args: &ArgumentTypes) -> bool {
        let fixed = self.fixed_arguments();

        for (name, _) in &args.named {
            if !fixed.iter().any(|a| a.name.eq_ignore_ascii_case(name)) {
                return false;
            }
        }

        for (idx, arg) in fixed.iter().enumerate() {
            let have = args
                .named_type(arg.name)
                .or_else(|| args.positional.get(idx).copied());
            match have {
                Some(have) if !arg.accepts(have) => return false,
                Some(_) => (),
                None if arg.default.is_some() => (),
                None => return false,
            }
        }

        args.positional.len() <= fixed.len() || self.variadic_argument().is_some()
    }

    /// Concrete return type for a call site.
    ///
    /// Generic signatures take the type of the first argument with a concrete
    /// row type.
    pub fn resolve_return_type(&self, args: &ArgumentTypes) -> DataType {
        if self.return_type != DataType::Any {
            return self.return_type;
        }
        args.positional
            .iter()
            .chain(args.named.iter().map(|(_, t)| t))
            .find(|t| t.is_row_type())
            .copied()
            .unwrap_or(DataType::Any)
    }

    /// Order call site arguments to match the declared arguments.
    ///
    /// For each declared argument the value comes from a named argument, then
    /// the positional argument at the same position, then the declared
    /// default. Surplus positional arguments go to the variadic argument.
    pub fn bind_arguments<T, F>(&self, positional: &[T], named: &[(String, T)], default: F) -> Result<Vec<T>>
    where
        T: Clone,
        F: Fn(&ScalarValue) -> T,
    {
        let fixed = self.fixed_arguments();
        let mut out = Vec::with_capacity(positional.len().max(fixed.len()));

        for (idx, arg) in fixed.iter().enumerate() {
            let named = named
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(arg.name))
                .map(|(_, v)| v.clone());
            let value = match (named, positional.get(idx), &arg.default) {
                (Some(v), _, _) => v,
                (None, Some(v), _) => v.clone(),
                (None, None, Some(d)) => default(d),
                (None, None, None) => {
                    return Err(DbError::compile(format!(
                        "Cannot set argument '{}' of function '{}'",
                        arg.name, self.name
                    )));
                }
            };
            out.push(value);
        }

        if positional.len() > fixed.len() {
            if self.variadic_argument().is_none() {
                return Err(DbError::compile(format!(
                    "Too many arguments for function '{}'",
                    self.name
                ))
                .with_field("expected", fixed.len())
                .with_field("got", positional.len()));
            }
            out.extend(positional[fixed.len()..].iter().cloned());
        }

        Ok(out)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.name,
            DisplayList(&self.arguments),
            self.return_type
        )
    }
}

pub type ScalarFunctionImpl =
    Arc<dyn Fn(&[ScalarValue]) -> Result<ScalarValue, ErrorCode> + Send + Sync>;

#[derive(Clone)]
pub enum FunctionImpl {
    Scalar(ScalarFunctionImpl),
    Aggregate(Arc<dyn AggregateFunction>),
}

pub struct Function {
    pub signature: Signature,
    pub description: &'static str,
    pub implementation: FunctionImpl,
}

impl Function {
    pub fn is_aggregate(&self) -> bool {
        matches!(self.implementation, FunctionImpl::Aggregate(_))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.signature.to_string())
            .field("aggregate", &self.is_aggregate())
            .finish()
    }
}

/// Registry of scalar and aggregate functions.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Overloads keyed by lowercase name, in registration order.
    functions: HashMap<String, Vec<Arc<Function>>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        scalar::register_builtins(&mut registry);
        aggregate::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, function: Function) {
        self.functions
            .entry(function.signature.name.to_ascii_lowercase())
            .or_default()
            .push(Arc::new(function));
    }

    pub fn register_scalar<F>(&mut self, signature: Signature, description: &'static str, f: F)
    where
        F: Fn(&[ScalarValue]) -> Result<ScalarValue, ErrorCode> + Send + Sync + 'static,
    {
        self.register(Function {
            signature,
            description,
            implementation: FunctionImpl::Scalar(Arc::new(f)),
        })
    }

    pub fn register_aggregate(
        &mut self,
        signature: Signature,
        description: &'static str,
        agg: impl AggregateFunction + 'static,
    ) {
        self.register(Function {
            signature,
            description,
            implementation: FunctionImpl::Aggregate(Arc::new(agg)),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    /// All registered overloads for a name.
    pub fn overloads(&self, name: &str) -> &[Arc<Function>] {
        self.functions
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Find the overload matching the argument types.
    ///
    /// The first matching overload in registration order wins.
    pub fn find(&self, name: &str, args: &ArgumentTypes) -> Result<Arc<Function>> {
        let overloads = self.overloads(name);
        if overloads.is_empty() {
            return Err(DbError::compile(format!("Cannot find function '{name}'")));
        }

        let mut matching = overloads.iter().filter(|f| f.signature.matches(args));
        let Some(found) = matching.next() else {
            return Err(DbError::compile(format!(
                "No overload of '{name}' matches arguments {args}"
            ))
            .with_field(
                "candidates",
                DisplayList(
                    &overloads
                        .iter()
                        .map(|f| f.signature.to_string())
                        .collect::<Vec<_>>(),
                ),
            ));
        };

        let others = matching.count();
        if others > 0 {
            debug!(
                function = name,
                %args,
                chosen = %found.signature,
                others,
                "ambiguous function overload, using first registered"
            );
        }

        Ok(found.clone())
    }

    /// Number of registered functions, counting each overload.
    pub fn len(&self) -> usize {
        self.functions.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        reg.register_scalar(
            Signature::new(
                "pad",
                [
                    FunctionArgument::required("value", DataType::String),
                    FunctionArgument::optional("width", DataType::Integer, 8.into()),
                ],
                DataType::String,
            ),
            "",
            |_| Ok(ScalarValue::Null),
        );
        reg.register_scalar(
            Signature::new(
                "pick",
                [FunctionArgument::variadic("values", DataType::Any)],
                DataType::Any,
            ),
            "",
            |_| Ok(ScalarValue::Null),
        );
        reg
    }

    #[test]
    fn default_covers_missing() {
        let reg = registry();
        reg.find("PAD", &ArgumentTypes::positional([DataType::String]))
            .unwrap();
        reg.find(
            "pad",
            &ArgumentTypes::positional([DataType::String, DataType::Integer]),
        )
        .unwrap();
        reg.find(
            "pad",
            &ArgumentTypes::positional([DataType::Integer]),
        )
        .unwrap_err();
    }

    #[test]
    fn named_arguments() {
        let reg = registry();
        let args = ArgumentTypes {
            positional: vec![DataType::String],
            named: vec![("width".to_string(), DataType::Integer)],
        };
        reg.find("pad", &args).unwrap();

        let bad = ArgumentTypes {
            positional: vec![DataType::String],
            named: vec![("height".to_string(), DataType::Integer)],
        };
        reg.find("pad", &bad).unwrap_err();
    }

    #[test]
    fn variadic_absorbs_surplus() {
        let reg = registry();
        let args = ArgumentTypes::positional([DataType::Integer, DataType::String, DataType::Float]);
        let f = reg.find("pick", &args).unwrap();
        assert_eq!(DataType::Integer, f.signature.resolve_return_type(&args));

        reg.find(
            "pad",
            &ArgumentTypes::positional([DataType::String, DataType::Integer, DataType::Integer]),
        )
        .unwrap_err();
    }

    #[test]
    fn generic_return_falls_back_to_first_concrete() {
        let sig = Signature::new(
            "g",
            [FunctionArgument::variadic("v", DataType::Any)],
            DataType::Any,
        );
        let args = ArgumentTypes::positional([DataType::Null, DataType::String]);
        assert_eq!(DataType::String, sig.resolve_return_type(&args));
    }

    #[test]
    fn bind_arguments_precedence() {
        let sig = Signature::new(
            "f",
            [
                FunctionArgument::required("a", DataType::Any),
                FunctionArgument::optional("b", DataType::Any, 10.into()),
                FunctionArgument::required("c", DataType::Any),
            ],
            DataType::Any,
        );
        let bound = sig
            .bind_arguments(
                &["p0".to_string()],
                &[("c".to_string(), "named_c".to_string())],
                |d| format!("default_{d}"),
            )
            .unwrap();
        assert_eq!(vec!["p0", "default_10", "named_c"], bound);

        sig.bind_arguments(&["p0".to_string()], &[], |d| d.to_string())
            .unwrap_err();
    }

    #[test]
    fn first_registered_wins() {
        let mut reg = FunctionRegistry::new();
        reg.register_scalar(
            Signature::new("f", [FunctionArgument::required("x", DataType::Any)], DataType::Integer),
            "first",
            |_| Ok(1.into()),
        );
        reg.register_scalar(
            Signature::new("f", [FunctionArgument::required("x", DataType::Integer)], DataType::Integer),
            "second",
            |_| Ok(2.into()),
        );
        let f = reg
            .find("f", &ArgumentTypes::positional([DataType::Integer]))
            .unwrap();
        assert_eq!("first", f.description);
    }
}
