//! Names and call shapes of the runtime ABI (spec §6). Centralizing the
//! symbol strings here means a typo becomes one compile error at the call
//! site instead of a silent runtime link failure.

pub const STRING_NEW_UTF8: &str = "string_new_utf8";
pub const STRING_RELEASE: &str = "string_release";
pub const STRING_RETAIN: &str = "string_retain";
pub const STRING_CONCAT: &str = "string_concat";
pub const STRING_SLICE: &str = "string_slice";
pub const STRING_SLICE_ASSIGN: &str = "string_slice_assign";
pub const STRING_LEN: &str = "string_len";
pub const STRING_MID: &str = "string_mid";
pub const STRING_LEFT: &str = "string_left";
pub const STRING_RIGHT: &str = "string_right";
pub const STRING_UPPER: &str = "string_upper";
pub const STRING_LOWER: &str = "string_lower";
pub const STRING_TRIM: &str = "string_trim";
pub const STRING_CMP: &str = "string_cmp";
pub const STRING_TO_UTF8: &str = "string_to_utf8";
pub const VAL_FROM_STRING: &str = "val_from_string";
pub const STR_FROM_DOUBLE: &str = "str_from_double";
pub const STR_FROM_INT: &str = "str_from_int";

pub const ARRAY_NEW: &str = "array_new";
pub const ARRAY_FREE: &str = "array_free";
pub const ARRAY_REDIM: &str = "array_redim";
pub const ARRAY_REDIM_PRESERVE: &str = "array_redim_preserve";
pub const ARRAY_ERASE: &str = "array_erase";

pub const OBJECT_NEW: &str = "object_new";
pub const OBJECT_DELETE: &str = "object_delete";
pub const OBJECT_IS_NOTHING: &str = "object_is_nothing";
pub const OBJECT_RETAIN: &str = "object_retain";

pub const LIST_APPEND: &str = "list_append";
pub const LIST_PREPEND: &str = "list_prepend";
pub const LIST_POP: &str = "list_pop";
pub const LIST_SHIFT: &str = "list_shift";
pub const LIST_HEAD: &str = "list_head";
pub const LIST_TAIL: &str = "list_tail";
pub const LIST_GET: &str = "list_get";
pub const LIST_LENGTH: &str = "list_length";
pub const LIST_EMPTY: &str = "list_empty";
pub const LIST_COPY: &str = "list_copy";
pub const LIST_REVERSE: &str = "list_reverse";
pub const LIST_EXTEND: &str = "list_extend";
pub const LIST_INSERT: &str = "list_insert";
pub const LIST_REMOVE: &str = "list_remove";
pub const LIST_CLEAR: &str = "list_clear";
pub const LIST_CONCAT: &str = "list_concat";

pub const HASHMAP_NEW: &str = "hashmap_new";
pub const HASHMAP_FREE: &str = "hashmap_free";
pub const HASHMAP_INSERT: &str = "hashmap_insert";
pub const HASHMAP_LOOKUP: &str = "hashmap_lookup";
pub const HASHMAP_REMOVE: &str = "hashmap_remove";
pub const HASHMAP_SIZE: &str = "hashmap_size";
pub const HASHMAP_HASKEY: &str = "hashmap_haskey";
pub const HASHMAP_CLEAR: &str = "hashmap_clear";
pub const HASHMAP_KEYS: &str = "hashmap_keys";

pub const SPAWN: &str = "spawn";
pub const AWAIT: &str = "await";
pub const SEND: &str = "send";
pub const RECEIVE: &str = "receive";
pub const MATCH_RECEIVE_POLL: &str = "match_receive_poll";
pub const MARSHALL: &str = "marshall";
pub const UNMARSHALL: &str = "unmarshall";
pub const CANCEL: &str = "cancel";
pub const CANCELLED: &str = "cancelled";
pub const AFTER_MS_SEND: &str = "after_ms_send";
pub const EVERY_MS_SEND: &str = "every_ms_send";
pub const TIMER_STOP_ALL: &str = "timer_stop_all";

pub const EXCEPTION_PUSH: &str = "exception_push";
pub const EXCEPTION_POP: &str = "exception_pop";
pub const RUNTIME_THROW: &str = "runtime_throw";
pub const RUNTIME_RETHROW: &str = "runtime_rethrow";
pub const RUNTIME_ERR: &str = "runtime_err";
pub const RUNTIME_ERL: &str = "runtime_erl";

pub const BASIC_PRINT_INT: &str = "basic_print_int";
pub const BASIC_PRINT_DOUBLE: &str = "basic_print_double";
pub const BASIC_PRINT_STRING: &str = "basic_print_string";
pub const BASIC_PRINT_NEWLINE: &str = "basic_print_newline";
pub const BASIC_PRINT_TAB: &str = "basic_print_tab";
pub const BASIC_INPUT_LINE: &str = "basic_input_line";
pub const BASIC_CLS: &str = "basic_cls";
pub const BASIC_LOCATE: &str = "basic_locate";
pub const BASIC_COLOR: &str = "basic_color";
pub const BASIC_KBGET: &str = "basic_kbget";
pub const BASIC_KBHIT: &str = "basic_kbhit";

pub const SCOPE_PUSH: &str = "scope_push";
pub const SCOPE_POP: &str = "scope_pop";
pub const SCOPE_RETAIN: &str = "scope_retain";

pub const DATA_READ_INT: &str = "data_read_int";
pub const DATA_READ_DOUBLE: &str = "data_read_double";
pub const DATA_READ_STRING: &str = "data_read_string";
pub const DATA_RESTORE: &str = "data_restore";
