//! Динамическая модель обёрнутого объекта: значения, аргументы, члены.

use super::errors::{ArgError, CallError};
use std::{
    any::{type_name, Any},
    collections::HashMap,
    fmt,
    sync::Arc,
};


/// Разделяемое значение со стёртым типом. Клон сохраняет идентичность.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn unit() -> Self {
        Self::new(())
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Value(..)")
    }
}


/// Аргументы вызова: позиционные и именованные.
///
/// Параметр можно передать либо по позиции, либо по имени:
/// `Args::new().arg(1).kwarg("second", 2)`.
#[derive(Clone, Debug, Default)]
pub struct Args {
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.positional.push(Value::new(value));
        self
    }

    pub fn arg_value(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    pub fn kwarg<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.keyword.push((name.into(), Value::new(value)));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Параметр `index`/`name`: сначала по позиции, затем по имени
    pub fn param<T: Any + Clone>(&self, index: usize, name: &str) -> Result<T, ArgError> {
        let value = self
            .positional
            .get(index)
            .or_else(|| self.keyword(name))
            .ok_or_else(|| ArgError::Missing {
                index,
                name: name.to_owned(),
            })?;

        value.get::<T>().ok_or_else(|| ArgError::WrongType {
            index,
            name: name.to_owned(),
            expected: type_name::<T>(),
        })
    }
}


type MethodFn = dyn Fn(Args) -> Result<Value, CallError> + Send + Sync;

/// Вызываемый член обёрнутого объекта
#[derive(Clone)]
pub struct Method(Arc<MethodFn>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Метод с типизированным результатом
    pub fn typed<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Args) -> Result<T, CallError> + Send + Sync + 'static,
    {
        Self::new(move |args| f(args).map(Value::new))
    }

    #[inline]
    pub fn call(&self, args: Args) -> Result<Value, CallError> {
        (self.0)(args)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method(..)")
    }
}


/// Результат поиска имени на обёрнутом объекте
#[derive(Clone, Debug)]
pub enum Member {
    Attr(Value),
    Method(Method),
}

impl Member {
    pub fn as_attr(&self) -> Option<&Value> {
        match self {
            Member::Attr(v) => Some(v),
            Member::Method(_) => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Member::Method(m) => Some(m),
            Member::Attr(_) => None,
        }
    }
}


/// Объект, чьи члены доступны по имени
pub trait Members: Send + Sync + 'static {
    fn member(&self, name: &str) -> Option<Member>;
}


type Accessor = Arc<dyn Fn() -> Member + Send + Sync>;

/// Таблица членов: имя -> thunk, заполняется при построении
#[derive(Clone, Default)]
pub struct MemberTable {
    accessors: HashMap<String, Accessor>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Фиксированный атрибут: каждое обращение отдаёт тот же [`Value`]
    pub fn attr<T: Any + Send + Sync>(self, name: impl Into<String>, value: T) -> Self {
        self.attr_value(name, Value::new(value))
    }

    pub fn attr_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.accessors
            .insert(name.into(), Arc::new(move || Member::Attr(value.clone())));
        self
    }

    /// Вычисляемый атрибут: `f` вызывается при каждом обращении
    pub fn property<T, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.accessors
            .insert(name.into(), Arc::new(move || Member::Attr(Value::new(f()))));
        self
    }

    pub fn method<T, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Args) -> Result<T, CallError> + Send + Sync + 'static,
    {
        let method = Method::typed(f);
        self.accessors
            .insert(name.into(), Arc::new(move || Member::Method(method.clone())));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }
}

impl Members for MemberTable {
    fn member(&self, name: &str) -> Option<Member> {
        self.accessors.get(name).map(|accessor| accessor())
    }
}

impl fmt::Debug for MemberTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("MemberTable").field("members", &names).finish()
    }
}
