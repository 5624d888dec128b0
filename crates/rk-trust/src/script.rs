//! Remote key installation script

use crate::keys::DeployableKey;

/// Shell snippet that appends `key` to `~/.ssh/authorized_keys` once.
///
/// The key travels base64-encoded so that no part of it is interpreted by
/// the remote shell. The key is appended only when no existing entry
/// contains it, so entries carrying an options prefix or trailing text
/// count as present. A file missing its final newline gets one before the
/// append.
pub fn deploy_key_script(key: &DeployableKey) -> String {
    format!(
        r#"set -e
umask 077
mkdir -p "$HOME/.ssh"
chmod 700 "$HOME/.ssh"
tmp_key=$(mktemp)
trap 'rm -f "$tmp_key"' EXIT
printf '%s' '{encoded}' | base64 -d > "$tmp_key"
auth_keys="$HOME/.ssh/authorized_keys"
touch "$auth_keys"
if ! grep -Fq -- "$(head -n 1 "$tmp_key")" "$auth_keys"; then
  if [ -s "$auth_keys" ] && [ -n "$(tail -c 1 "$auth_keys")" ]; then
    printf '\n' >> "$auth_keys"
  fi
  cat "$tmp_key" >> "$auth_keys"
fi
chmod 600 "$auth_keys"
"#,
        encoded = key.encoded()
    )
}
