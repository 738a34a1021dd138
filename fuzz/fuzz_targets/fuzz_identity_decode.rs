#![no_main]

use libfuzzer_sys::fuzz_target;
use mongo_rbac::role::identity;
use mongo_rbac::RoleIdentity;

fuzz_target!(|token: &str| {
    if let Ok(id) = RoleIdentity::decode(token) {
        // Anything that decodes must re-encode to a token naming the same role
        let again = RoleIdentity::decode(&id.encode()).expect("re-encoded token decodes");
        assert_eq!(again, id);

        let (role, database) = identity::decode(token).expect("free decode agrees");
        assert_eq!(role, id.role());
        assert_eq!(database, id.database());
    }
});
