//! JNI calls into the hosting activity.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use jni::{
    objects::{JObject, JString, JValueGen},
    sys::{JNIInvokeInterface_, _jobject, jint},
    JNIEnv, JavaVM,
};
use log::info;
use slint::android::AndroidApp;

pub const CAMERA_PERMISSION: &str = "android.permission.CAMERA";
pub const RECORD_AUDIO_PERMISSION: &str = "android.permission.RECORD_AUDIO";

const PERMISSION_REQUEST_CODE: i32 = 100;

fn java_vm(app: &AndroidApp) -> Result<JavaVM> {
    unsafe { Ok(JavaVM::from_raw(app.vm_as_ptr() as *mut *const JNIInvokeInterface_)?) }
}

fn activity<'a>(app: &AndroidApp) -> JObject<'a> {
    unsafe { JObject::from_raw(app.activity_as_ptr() as *mut _jobject) }
}

pub fn sdk_version(app: &AndroidApp) -> Result<i32> {
    let vm = java_vm(app)?;
    let mut env = vm.attach_current_thread()?;
    Ok(env
        .get_static_field("android/os/Build$VERSION", "SDK_INT", "I")?
        .i()?)
}

pub fn check_self_permission(app: &AndroidApp, permission: &str) -> Result<bool> {
    let vm = java_vm(app)?;
    let mut env = vm.attach_current_thread()?;
    let granted_int = env
        .get_static_field(
            "android/content/pm/PackageManager",
            "PERMISSION_GRANTED",
            "I",
        )?
        .i()?;
    let permission_str = env.new_string(permission)?;
    let result = env
        .call_method(
            activity(app),
            "checkSelfPermission",
            "(Ljava/lang/String;)I",
            &[JValueGen::Object(&JObject::from(permission_str))],
        )?
        .i()?;
    Ok(result == granted_int)
}

pub fn request_permissions(app: &AndroidApp, permissions: &[&str], request_code: i32) -> Result<()> {
    let vm = java_vm(app)?;
    let mut env = vm.attach_current_thread()?;

    let java_permission_array =
        env.new_object_array(permissions.len() as jint, "java/lang/String", JObject::null())?;
    for (index, permission) in permissions.iter().enumerate() {
        let permission_str = env.new_string(*permission)?;
        env.set_object_array_element(&java_permission_array, index as jint, permission_str)?;
    }

    env.call_method(
        activity(app),
        "requestPermissions",
        "([Ljava/lang/String;I)V",
        &[
            JValueGen::Object(&JObject::from(java_permission_array)),
            request_code.into(),
        ],
    )?;
    Ok(())
}

/// Prompt for camera and microphone access if either is missing.
pub fn request_camera_permissions(app: &AndroidApp) -> Result<()> {
    let sdk_version = sdk_version(app)?;
    info!("sdk version:{sdk_version}");
    // granted at install time before M
    if sdk_version < 23 {
        return Ok(());
    }
    let mut missing = vec![];
    for permission in [CAMERA_PERMISSION, RECORD_AUDIO_PERMISSION] {
        if !check_self_permission(app, permission)? {
            missing.push(permission);
        }
    }
    if !missing.is_empty() {
        info!("requesting {missing:?}");
        request_permissions(app, &missing, PERMISSION_REQUEST_CODE)?;
    }
    Ok(())
}

/// `Context.getExternalFilesDir(Environment.DIRECTORY_PICTURES)`
pub fn external_pictures_dir(app: &AndroidApp) -> Result<PathBuf> {
    let vm = java_vm(app)?;
    let mut env = vm.attach_current_thread()?;

    let pictures = env
        .get_static_field("android/os/Environment", "DIRECTORY_PICTURES", "Ljava/lang/String;")?
        .l()?;
    let file = env
        .call_method(
            activity(app),
            "getExternalFilesDir",
            "(Ljava/lang/String;)Ljava/io/File;",
            &[JValueGen::Object(&pictures)],
        )?
        .l()?;
    if file.is_null() {
        return Err(anyhow!("external storage is not available"));
    }
    absolute_path(&mut env, file)
}

fn absolute_path(env: &mut JNIEnv, file: JObject) -> Result<PathBuf> {
    let path = env
        .call_method(file, "getAbsolutePath", "()Ljava/lang/String;", &[])?
        .l()?;
    let path: JString = path.into();
    let path: String = env.get_string(&path)?.into();
    Ok(PathBuf::from(path))
}

/// Display rotation in degrees (0, 90, 180 or 270).
pub fn display_rotation(app: &AndroidApp) -> Result<i32> {
    let vm = java_vm(app)?;
    let mut env = vm.attach_current_thread()?;
    let window_manager = env
        .call_method(activity(app), "getWindowManager", "()Landroid/view/WindowManager;", &[])?
        .l()?;
    let display = env
        .call_method(window_manager, "getDefaultDisplay", "()Landroid/view/Display;", &[])?
        .l()?;
    let rotation = env.call_method(display, "getRotation", "()I", &[])?.i()?;
    Ok(rotation * 90)
}
