pub use enclose::*;

#[macro_export]
macro_rules! effect {
    (( $($d_tt:tt)* ) $rt:expr => $($b:tt)*) => {
        $rt.effect($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($rt:expr => $($b:tt)*) => {
        $rt.effect(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) $rt:expr => $($b:tt)*) => {
        $rt.computed($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($rt:expr => $($b:tt)*) => {
        $rt.computed(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! record {
    { $($k:expr => $v:expr),* $(,)? } => {{
        let record = $crate::Record::new();
        $( record.insert($k, $crate::Value::from($v)); )*
        $crate::Value::Record(record)
    }};
}

#[macro_export]
macro_rules! list {
    [ $($v:expr),* $(,)? ] => {{
        let list = $crate::List::new();
        $( list.push_raw($crate::Value::from($v)); )*
        $crate::Value::List(list)
    }};
}
